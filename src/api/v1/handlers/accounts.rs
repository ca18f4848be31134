/*
 * Responsibility
 * - /accounts 系 handler (ReadAccounts)
 * - /accounts/{id}/balances (ReadBalances), /accounts/{id}/transactions (ReadTransactions)
 */
use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Response,
};

use crate::{
    api::v1::{
        dto::open_finance::{PageQuery, TransactionQuery},
        extractors::FapiCtx,
        response,
    },
    error::AppError,
    state::AppState,
};

pub async fn list_accounts(
    State(state): State<AppState>,
    ctx: FapiCtx,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::invalid_request(e.body_text()))?;
    let page = state.pipeline.page_request(query.page, query.page_size)?;

    let outcome = state
        .pipeline
        .read_page(&ctx.as_request(), page, state.ports.accounts.as_ref(), state.clock.now())
        .await?;

    Ok(response::page(outcome, &ctx.htu))
}

pub async fn get_account(
    State(state): State<AppState>,
    ctx: FapiCtx,
    Path(account_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state
        .pipeline
        .read_item(
            &ctx.as_request(),
            &account_id,
            state.ports.accounts.as_ref(),
            state.clock.now(),
        )
        .await?;

    Ok(response::item(outcome))
}

pub async fn get_account_balances(
    State(state): State<AppState>,
    ctx: FapiCtx,
    Path(account_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state
        .pipeline
        .read_balances(
            &ctx.as_request(),
            &account_id,
            state.ports.accounts.as_ref(),
            state.ports.balances.as_ref(),
            state.clock.now(),
        )
        .await?;

    Ok(response::item(outcome))
}

pub async fn list_account_transactions(
    State(state): State<AppState>,
    ctx: FapiCtx,
    Path(account_id): Path<String>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::invalid_request(e.body_text()))?;
    let page = state.pipeline.page_request(query.page, query.page_size)?;

    let outcome = state
        .pipeline
        .read_transactions(
            &ctx.as_request(),
            &account_id,
            query.window(),
            page,
            state.ports.accounts.as_ref(),
            state.ports.transactions.as_ref(),
            state.clock.now(),
        )
        .await?;

    Ok(response::page(outcome, &query.link_base(&ctx.htu)))
}
