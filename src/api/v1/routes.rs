/*
 * Responsibility
 * - v1 の URL 構造を定義 (/open-finance/v1 の下に nest される)
 * - 全 route が FapiCtx + AccessPipeline を通る (route_layer は使わない)
 */
use axum::{Router, routing::get};

use crate::state::AppState;

use crate::api::v1::handlers::{
    accounts::{get_account, get_account_balances, list_account_transactions, list_accounts},
    policies::{get_policy, list_policies},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/insurance-policies", get(list_policies))
        .route("/insurance-policies/{policy_id}", get(get_policy))
        .route("/accounts", get(list_accounts))
        .route("/accounts/{account_id}", get(get_account))
        .route("/accounts/{account_id}/balances", get(get_account_balances))
        .route(
            "/accounts/{account_id}/transactions",
            get(list_account_transactions),
        )
}
