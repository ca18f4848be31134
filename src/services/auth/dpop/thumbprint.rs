//! JWK thumbprint (RFC 7638).
//!
//! Required members only, lexicographic member order, no whitespace, SHA-256,
//! base64url without padding.
use std::collections::BTreeMap;

use base64::Engine as _;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum ThumbprintError {
    #[error("unsupported jwk for thumbprint")]
    UnsupportedKey,
    #[error("jwk canonicalization failed")]
    Canonicalization,
}

pub fn thumbprint(jwk: &Jwk) -> Result<String, ThumbprintError> {
    // BTreeMap serializes members in sorted order.
    let mut members: BTreeMap<&'static str, &str> = BTreeMap::new();

    match &jwk.algorithm {
        AlgorithmParameters::OctetKeyPair(params) => {
            // `EllipticCurve` does not implement Display/ToString, so match explicitly.
            if !matches!(params.curve, EllipticCurve::Ed25519) {
                return Err(ThumbprintError::UnsupportedKey);
            }
            members.insert("crv", "Ed25519");
            members.insert("kty", "OKP");
            members.insert("x", &params.x);
        }
        AlgorithmParameters::EllipticCurve(params) => {
            let crv = match params.curve {
                EllipticCurve::P256 => "P-256",
                EllipticCurve::P384 => "P-384",
                EllipticCurve::P521 => "P-521",
                #[allow(unreachable_patterns)]
                _ => return Err(ThumbprintError::UnsupportedKey),
            };
            members.insert("crv", crv);
            members.insert("kty", "EC");
            members.insert("x", &params.x);
            members.insert("y", &params.y);
        }
        AlgorithmParameters::RSA(params) => {
            members.insert("e", &params.e);
            members.insert("kty", "RSA");
            members.insert("n", &params.n);
        }
        _ => return Err(ThumbprintError::UnsupportedKey),
    }

    if members.values().any(|v| v.is_empty()) {
        return Err(ThumbprintError::UnsupportedKey);
    }

    let canonical =
        serde_json::to_string(&members).map_err(|_| ThumbprintError::Canonicalization)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest))
}
