/*
 * Responsibility
 * - /insurance-policies 系 handler (ReadPolicies)
 * - ヘッダは FapiCtx、認可と読み取りは AccessPipeline に委譲する
 */
use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Response,
};

use crate::{
    api::v1::{dto::open_finance::PageQuery, extractors::FapiCtx, response},
    error::AppError,
    state::AppState,
};

pub async fn list_policies(
    State(state): State<AppState>,
    ctx: FapiCtx,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::invalid_request(e.body_text()))?;
    let page = state.pipeline.page_request(query.page, query.page_size)?;

    let outcome = state
        .pipeline
        .read_page(&ctx.as_request(), page, state.ports.policies.as_ref(), state.clock.now())
        .await?;

    Ok(response::page(outcome, &ctx.htu))
}

pub async fn get_policy(
    State(state): State<AppState>,
    ctx: FapiCtx,
    Path(policy_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state
        .pipeline
        .read_item(
            &ctx.as_request(),
            &policy_id,
            state.ports.policies.as_ref(),
            state.clock.now(),
        )
        .await?;

    Ok(response::item(outcome))
}
