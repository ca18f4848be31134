use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

// Errors returned by access-token verification + strict claim validation.
#[derive(Debug, Error)]
pub enum AccessJwtError {
    #[error("jwt verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("missing or invalid 'aud' claim")]
    MissingOrInvalidAud,
    #[error("empty '{0}' claim")]
    EmptyClaim(&'static str),
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid ed25519 public key: {0}")]
    InvalidKey(String),
}

fn aud_is_present_and_valid(aud: &serde_json::Value) -> bool {
    match aud {
        // Typical: aud is a string
        serde_json::Value::String(s) => !s.trim().is_empty(),
        // Also valid: aud is an array of strings
        serde_json::Value::Array(arr) => arr.iter().any(|v| match v {
            serde_json::Value::String(s) => !s.trim().is_empty(),
            _ => false,
        }),
        // Missing claim ends up as Null due to #[serde(default)]
        _ => false,
    }
}

/// Access token (JWT) claims.
///
/// NOTE:
/// - `aud` in JWT can be either string or array; jsonwebtoken validates it via `Validation::set_audience`.
/// - `exp` / `nbf` are checked against the request clock, not by jsonwebtoken.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    // Keep as Value to accept both string and array. Validation handles audience checks.
    #[serde(default)]
    pub aud: serde_json::Value,

    pub sub: String,
    pub exp: i64,

    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub cnf: Option<CnfClaim>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CnfClaim {
    #[serde(default)]
    pub jkt: Option<String>,
}

/// AuthService が返す「検証済み・アプリ側で使う型」
///
/// - `cnf_jkt` は DPoP proof の鍵 thumbprint と突き合わせる (sender-constrained token)
/// - `participant_id()` は `x-fapi-financial-id` と一致しなければならない
/// - `iss/aud/exp` の整合性は `verify_verified` の中で保証される前提
#[derive(Debug, Clone)]
pub struct VerifiedAccessToken {
    pub subject: String,
    pub client_id: Option<String>,
    pub cnf_jkt: Option<String>,
}

impl VerifiedAccessToken {
    /// The participant the token was issued to: `client_id`, else `sub`.
    pub fn participant_id(&self) -> &str {
        match self.client_id.as_deref() {
            Some(client) if !client.trim().is_empty() => client,
            _ => &self.subject,
        }
    }
}

/// EdDSA (Ed25519) access-token verifier. Issuance lives elsewhere.
///
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct AuthService {
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_seconds: i64,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("AuthService")
            .field("validation", &self.validation)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl AuthService {
    pub fn new(
        access_public_key_pem: &str,
        issuer: &str,
        audience: &str,
        leeway_seconds: u64,
    ) -> Result<Self, AccessJwtError> {
        let decoding_key = DecodingKey::from_ed_pem(access_public_key_pem.as_bytes())
            .map_err(|e| AccessJwtError::InvalidKey(e.to_string()))?;

        Ok(Self::from_decoding_key(
            decoding_key,
            issuer,
            audience,
            leeway_seconds,
        ))
    }

    pub fn from_decoding_key(
        decoding_key: DecodingKey,
        issuer: &str,
        audience: &str,
        leeway_seconds: u64,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Time claims are evaluated against the injected request clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Self {
            decoding_key,
            validation,
            leeway_seconds: leeway_seconds as i64,
        }
    }

    // Verify and decode a JWT access token.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;

        Ok(data.claims)
    }

    /// Verify + strict claim validation.
    ///
    /// `jsonwebtoken::Validation` checks signature, `iss` and `aud`.
    /// This method additionally checks:
    /// - required claims are present *and not empty* (`iss`, `aud`, `sub`)
    /// - `exp` / `nbf` against `now` with leeway
    pub fn verify_strict(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, AccessJwtError> {
        let claims = self.verify(token)?;

        if claims.iss.trim().is_empty() {
            return Err(AccessJwtError::EmptyClaim("iss"));
        }
        if claims.sub.trim().is_empty() {
            return Err(AccessJwtError::EmptyClaim("sub"));
        }
        if !aud_is_present_and_valid(&claims.aud) {
            return Err(AccessJwtError::MissingOrInvalidAud);
        }

        let now = now.timestamp();
        if claims.exp.saturating_add(self.leeway_seconds) <= now {
            return Err(AccessJwtError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(self.leeway_seconds)
        {
            return Err(AccessJwtError::NotYetValid);
        }

        Ok(claims)
    }

    /// Verify + strict claim validation, then convert claims into an application-friendly type.
    ///
    /// This is the recommended entry-point for the access pipeline.
    pub fn verify_verified(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAccessToken, AccessJwtError> {
        let claims = self.verify_strict(token, now)?;

        Ok(VerifiedAccessToken {
            subject: claims.sub,
            client_id: claims.client_id,
            cnf_jkt: claims.cnf.and_then(|c| c.jkt).filter(|j| !j.is_empty()),
        })
    }
}
