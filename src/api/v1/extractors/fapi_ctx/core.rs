use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::{HeaderMap, header, request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::dpop::expected_htu;
use crate::state::AppState;

use super::FapiCtx;

const MAX_PARTICIPANT_ID_LEN: usize = 128;

/// Handler で FapiCtx を受け取るための extractor
/// 欠落・不正なヘッダは 400 (InvalidRequest) で返す
impl FromRequestParts<AppState> for FapiCtx
where
    AppState: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let access_token = dpop_access_token(headers)?;
        let proof = single_header(headers, "dpop")?
            .ok_or_else(|| AppError::invalid_request("missing DPoP header"))?;

        let interaction_id = single_header(headers, "x-fapi-interaction-id")?
            .filter(|v| Uuid::parse_str(v).is_ok())
            .ok_or_else(|| AppError::invalid_request("X-FAPI-Interaction-ID must be a UUID"))?;

        let participant_id = single_header(headers, "x-fapi-financial-id")?
            .filter(|v| is_valid_participant_id(v))
            .ok_or_else(|| AppError::invalid_request("missing or malformed x-fapi-financial-id"))?;

        let consent_id = single_header(headers, "x-consent-id")?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::invalid_request("missing X-Consent-ID header"))?;

        let if_none_match = joined_header(headers, header::IF_NONE_MATCH.as_str())?;

        // Nested routers see a stripped path; the proof is bound to the full one.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let htu = expected_htu(headers, &uri, state.public_base_url.as_deref());

        Ok(FapiCtx {
            access_token,
            proof,
            method: parts.method.as_str().to_string(),
            htu,
            interaction_id,
            participant_id,
            consent_id,
            if_none_match,
        })
    }
}

// `Authorization: DPoP <token>`; Bearer or any other scheme is a malformed request here.
fn dpop_access_token(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = single_header(headers, header::AUTHORIZATION.as_str())?
        .ok_or_else(|| AppError::invalid_request("missing Authorization header"))?;

    let (scheme, token) = raw
        .split_once(' ')
        .ok_or_else(|| AppError::invalid_request("malformed Authorization header"))?;
    if !scheme.eq_ignore_ascii_case("dpop") {
        return Err(AppError::invalid_request(
            "Authorization scheme must be DPoP",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::invalid_request("malformed Authorization header"));
    }
    Ok(token.to_string())
}

// At most one occurrence, visible ASCII. Absent => Ok(None).
fn single_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, AppError> {
    let mut values = headers.get_all(name).iter();
    let Some(first) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(AppError::invalid_request(format!("duplicate {name} header")));
    }
    let value = first
        .to_str()
        .map_err(|_| AppError::invalid_request(format!("invalid {name} header")))?;
    Ok(Some(value.to_string()))
}

// List-valued header (RFC 9110 §5.3): repeated lines are one comma-separated value.
fn joined_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, AppError> {
    let mut parts = Vec::new();
    for value in headers.get_all(name) {
        let value = value
            .to_str()
            .map_err(|_| AppError::invalid_request(format!("invalid {name} header")))?;
        parts.push(value);
    }
    Ok((!parts.is_empty()).then(|| parts.join(", ")))
}

fn is_valid_participant_id(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= MAX_PARTICIPANT_ID_LEN
        && !v.chars().any(|c| c.is_whitespace() || c.is_control())
}
