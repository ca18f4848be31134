//! CORS policy for browser clients.
//!
//! Note:
//! - Participants normally call server-to-server, where CORS does not apply. This only
//!   matters for browser-based tooling (developer portals, sandboxes).
//!
//! Policy:
//! - Development: permissive (Allow-Origin: *), WITHOUT credentials.
//! - Production: allowlist origins from Config (comma-separated env var), WITHOUT credentials.
//! - Only read methods; the FAPI request headers are allowed and the cache/tag
//!   response headers are exposed.

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;

/// Apply CORS policy to the given Router.
///
/// IMPORTANT:
/// - Do not combine wildcard origin (`Any`) with `allow_credentials(true)`.
pub fn apply(router: Router, config: &Config) -> Router {
    let cors = if config.app_env.is_production() {
        // An empty allowlist allows no origin at all.
        let allowed: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
            allowed.iter().any(|v| v == origin)
        });

        CorsLayer::new().allow_origin(allow_origin)
    } else {
        CorsLayer::new().allow_origin(Any)
    }
    .allow_methods([Method::GET, Method::OPTIONS])
    .allow_headers([
        header::AUTHORIZATION,
        header::ACCEPT,
        header::IF_NONE_MATCH,
        HeaderName::from_static("dpop"),
        HeaderName::from_static("x-fapi-interaction-id"),
        HeaderName::from_static("x-fapi-financial-id"),
        HeaderName::from_static("x-consent-id"),
        HeaderName::from_static("x-request-id"),
    ])
    .expose_headers([
        header::ETAG,
        HeaderName::from_static("x-of-cache"),
        HeaderName::from_static("x-fapi-interaction-id"),
        HeaderName::from_static("x-request-id"),
    ])
    .max_age(std::time::Duration::from_secs(60 * 10));

    router.layer(cors)
}
