//! DPoP proof validation (RFC 9449) - core logic.
//!
//! This module does not know about Axum extractors. The HTTP layer rebuilds the
//! request target (`expected_htu`) and hands over the raw proof, the access token and
//! the token's `cnf.jkt`. Checks run in a fixed order and each one has its own
//! rejection reason:
//!
//! 1. structure + signature (`InvalidProof`)
//! 2. `htm` (`MethodMismatch`, case-sensitive)
//! 3. `htu` without query (`UriMismatch`)
//! 4. `iat` window (`StaleOrFutureProof`)
//! 5. `jti` insert-if-absent (`ReplayDetected`)
//! 6. `ath` (`TokenBindingMismatch`)
//! 7. proof key thumbprint vs `cnf.jkt` (`KeyBindingMismatch`)

use std::sync::Arc;

use axum::http::{HeaderMap, Uri, header};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, jwk::Jwk};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::services::auth::dpop::thumbprint::thumbprint;
use crate::services::auth::dpop::types::{DpopClaims, DpopError, DpopPolicy, VerifiedDpop};
use crate::services::auth::replay::ReplayStore;

/// The request a proof must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct ProofTarget<'a> {
    pub method: &'a str,
    // Absolute URI of the request; any query string is ignored.
    pub uri: &'a str,
}

#[derive(Clone)]
pub struct DpopVerifier {
    policy: DpopPolicy,
    replay_store: Arc<dyn ReplayStore>,
}

impl std::fmt::Debug for DpopVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DpopVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

struct DecodedProof {
    htm: String,
    htu: String,
    iat: i64,
    jti: String,
    ath: Option<String>,
    jkt: String,
}

impl DpopVerifier {
    pub fn new(policy: DpopPolicy, replay_store: Arc<dyn ReplayStore>) -> Self {
        Self {
            policy,
            replay_store,
        }
    }

    /// Validate one proof for one request.
    ///
    /// - `access_token`: when present, the proof must carry a matching `ath`.
    /// - `bound_jkt`: the token's `cnf.jkt`. A token without one cannot be proven.
    ///
    /// On success the `jti` has already been recorded; a second call with the same
    /// proof returns `ReplayDetected`.
    pub async fn validate(
        &self,
        proof: &str,
        target: ProofTarget<'_>,
        access_token: Option<&str>,
        bound_jkt: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedDpop, DpopError> {
        // 1) structure + signature
        let decoded = decode_proof(&self.policy, proof)?;

        // 2) htm check
        if decoded.htm != target.method {
            return Err(DpopError::MethodMismatch);
        }

        // 3) htu check
        // RFC 9449 compares without query and fragment.
        match (normalize_htu(&decoded.htu), normalize_htu(target.uri)) {
            (Some(actual), Some(expected)) if actual == expected => {}
            _ => return Err(DpopError::UriMismatch),
        }

        // 4) iat window check
        let now = now.timestamp();
        let leeway = self.policy.iat_leeway_seconds;
        // not too far in the future
        if decoded.iat > now.saturating_add(leeway) {
            return Err(DpopError::StaleOrFutureProof);
        }
        // not too old; an age that does not fit in i64 is stale
        let max_age = self.policy.max_age_seconds.saturating_add(leeway);
        match now.checked_sub(decoded.iat) {
            Some(age) if age <= max_age => {}
            _ => return Err(DpopError::StaleOrFutureProof),
        }

        // 5) replay check (atomic SET NX; the id is consumed here)
        let key = replay_key(&decoded.jti);
        let first_time = self
            .replay_store
            .check_and_store(&key, self.policy.replay_ttl_seconds)
            .await
            .map_err(|e| {
                warn!(error = ?e, "replay backend failure");
                DpopError::ReplayUnavailable(e)
            })?;
        if !first_time {
            return Err(DpopError::ReplayDetected);
        }

        // 6) ath check (bind proof to access token)
        if let Some(access) = access_token {
            let ath = decoded
                .ath
                .as_deref()
                .ok_or(DpopError::TokenBindingMismatch)?;
            if ath != compute_ath(access) {
                return Err(DpopError::TokenBindingMismatch);
            }
        }

        // 7) sender-constrained: cnf.jkt vs proof jwk thumbprint
        match bound_jkt {
            Some(expected) if expected == decoded.jkt => {}
            Some(_) => return Err(DpopError::KeyBindingMismatch),
            None if access_token.is_some() => return Err(DpopError::KeyBindingMismatch),
            None => {}
        }

        Ok(VerifiedDpop {
            jti: decoded.jti,
            iat: decoded.iat,
            htm: decoded.htm,
            htu: decoded.htu,
            jkt: decoded.jkt,
        })
    }
}

fn decode_proof(policy: &DpopPolicy, proof: &str) -> Result<DecodedProof, DpopError> {
    if proof.trim().is_empty() {
        return Err(DpopError::InvalidProof("empty proof"));
    }

    let header = jsonwebtoken::decode_header(proof).map_err(|e| {
        warn!(error = ?e, "invalid DPoP header");
        DpopError::InvalidProof("undecodable header")
    })?;

    match header.typ.as_deref() {
        Some(typ) if typ.eq_ignore_ascii_case("dpop+jwt") => {}
        _ => return Err(DpopError::InvalidProof("typ must be dpop+jwt")),
    }

    if is_symmetric(header.alg) || !policy.allowed_algs.contains(&header.alg) {
        return Err(DpopError::InvalidProof("unsupported alg"));
    }

    let jwk: Jwk = header.jwk.ok_or(DpopError::InvalidProof("missing jwk"))?;
    let jkt = thumbprint(&jwk).map_err(|_| DpopError::InvalidProof("unsupported jwk"))?;
    let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
        warn!(error = ?e, "invalid DPoP jwk");
        DpopError::InvalidProof("invalid jwk")
    })?;

    // A proof is not an access token: no exp/aud, freshness comes from iat.
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<DpopClaims>(proof, &decoding_key, &validation)
        .map_err(|e| {
            warn!(error = ?e, "invalid DPoP proof signature");
            DpopError::InvalidProof("signature verification failed")
        })?
        .claims;

    Ok(DecodedProof {
        htm: required(claims.htm, "missing htm")?,
        htu: required(claims.htu, "missing htu")?,
        iat: claims.iat.ok_or(DpopError::InvalidProof("missing iat"))?,
        jti: required(claims.jti, "missing jti")?,
        ath: claims.ath,
        jkt,
    })
}

fn required(value: Option<String>, reason: &'static str) -> Result<String, DpopError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DpopError::InvalidProof(reason))
}

fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

// Fixed-length key regardless of what the client put in jti.
fn replay_key(jti: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(jti.as_bytes()))
}

/// Rebuild the absolute request URI the proof's `htu` must match.
pub fn expected_htu(headers: &HeaderMap, uri: &Uri, public_base_url: Option<&str>) -> String {
    if let Some(base) = public_base_url {
        if let Ok(url) = build_htu_from_base(base, uri) {
            return url;
        }
        // If PUBLIC_BASE_URL is misconfigured, fall back to forwarded headers.
        // (Config validation rejects a bad value at startup.)
    }
    build_htu_from_forwarded(headers, uri)
}

fn build_htu_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    // Build absolute URL deterministically from configured public base URL.
    // `base` should be like: https://api.example.com
    let mut url = url::Url::parse(base)?;

    // Overwrite path from the incoming request target; query is never part of htu.
    url.set_path(uri.path());
    url.set_query(None);

    Ok(url.to_string())
}

fn build_htu_from_forwarded(headers: &HeaderMap, uri: &Uri) -> String {
    // Prefer proxy headers when present.
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, uri.path())
}

fn normalize_htu(htu: &str) -> Option<String> {
    // Normalization used only for equality comparison.
    // - lower scheme/host
    // - drop default ports
    // - keep path, drop query and fragment
    let url = url::Url::parse(htu).ok()?;
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url
        .port()
        .filter(|p| !((scheme == "http" && *p == 80) || (scheme == "https" && *p == 443)));

    let mut out = String::new();
    out.push_str(&scheme);
    out.push_str("://");
    out.push_str(&host);
    if let Some(port) = port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    Some(out)
}

/// `ath`: base64url(SHA-256(access_token)).
pub fn compute_ath(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
