/*
 * Responsibility
 * - ServeOutcome → HTTP response (200 JSON / 304 empty)
 * - ETag / X-OF-Cache ヘッダの付与
 */
use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::api::v1::dto::open_finance::{ItemResponse, ListResponse};
use crate::services::cache::Page;
use crate::services::open_finance::ServeOutcome;

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-of-cache");

pub fn item<T: Serialize>(outcome: ServeOutcome<T>) -> Response {
    respond(outcome, |data| ItemResponse { data })
}

pub fn page<T: Serialize>(outcome: ServeOutcome<Page<T>>, base: &str) -> Response {
    respond(outcome, |page| ListResponse::from_page(page, base))
}

fn respond<T, B: Serialize>(outcome: ServeOutcome<T>, body: impl FnOnce(T) -> B) -> Response {
    let (mut response, cache_hit, entity_tag) = match outcome {
        ServeOutcome::Fresh {
            value,
            cache_hit,
            entity_tag,
        } => (
            (StatusCode::OK, Json(body(value))).into_response(),
            cache_hit,
            entity_tag,
        ),
        ServeOutcome::NotModified {
            cache_hit,
            entity_tag,
        } => (StatusCode::NOT_MODIFIED.into_response(), cache_hit, entity_tag),
    };

    let headers = response.headers_mut();
    if let Ok(tag) = HeaderValue::from_str(&entity_tag) {
        headers.insert(header::ETAG, tag);
    }
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(if cache_hit { "HIT" } else { "MISS" }),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}
