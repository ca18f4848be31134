use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::services::auth::replay::ReplayError;

/// Policy knobs needed by the proof validator.
///
/// Kept here (instead of depending on `Config`) so the core logic stays testable.
#[derive(Debug, Clone)]
pub struct DpopPolicy {
    // Allowed iat drift (clock skew), seconds.
    pub iat_leeway_seconds: i64,
    // Maximum acceptable age of the proof (now - iat), seconds.
    pub max_age_seconds: i64,
    // How long an accepted jti is remembered.
    pub replay_ttl_seconds: u64,
    // Asymmetric algorithms accepted for the proof signature.
    pub allowed_algs: Vec<Algorithm>,
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            iat_leeway_seconds: 60,
            max_age_seconds: 300,
            replay_ttl_seconds: 420,
            allowed_algs: vec![Algorithm::EdDSA, Algorithm::ES256, Algorithm::PS256],
        }
    }
}

/// DPoP proof JWT claims (RFC 9449)
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DpopClaims {
    // HTTP method
    pub htm: Option<String>,
    // HTTP URI (no query / fragment)
    pub htu: Option<String>,
    // issued-at (seconds since epoch)
    pub iat: Option<i64>,
    // unique proof identifier
    pub jti: Option<String>,
    // Access token hash (base64url(SHA-256(access_token)))
    pub ath: Option<String>,
}

/// Accepted proof information useful for downstream checks and audit logs.
#[derive(Debug, Clone)]
pub struct VerifiedDpop {
    pub jti: String,
    pub iat: i64,
    pub htm: String,
    pub htu: String,
    // RFC 7638 thumbprint of the proof key
    pub jkt: String,
}

/// Rejection reasons, one per validation step.
#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    #[error("malformed DPoP proof: {0}")]
    InvalidProof(&'static str),
    #[error("htm mismatch")]
    MethodMismatch,
    #[error("htu mismatch")]
    UriMismatch,
    #[error("iat outside the acceptance window")]
    StaleOrFutureProof,
    #[error("replay detected")]
    ReplayDetected,
    #[error("ath does not match the access token")]
    TokenBindingMismatch,
    #[error("proof key does not match cnf.jkt")]
    KeyBindingMismatch,
    #[error("replay store unavailable")]
    ReplayUnavailable(#[source] ReplayError),
}
