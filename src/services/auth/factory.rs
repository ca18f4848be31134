/// Factory: build the proof / token verifiers from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::AuthService;
use crate::services::auth::access_jwt::AccessJwtError;
use crate::services::auth::dpop::{DpopPolicy, DpopVerifier};
use crate::services::auth::replay::ReplayStore;

pub fn build_auth_service(config: &Config) -> Result<AuthService, AccessJwtError> {
    AuthService::new(
        &config.access_jwt_public_key_pem,
        &config.auth_issuer,
        &config.auth_audience,
        config.access_token_leeway_seconds,
    )
}

pub fn dpop_policy(config: &Config) -> DpopPolicy {
    DpopPolicy {
        iat_leeway_seconds: config.dpop_iat_leeway_seconds,
        max_age_seconds: config.dpop_max_age_seconds,
        replay_ttl_seconds: config.replay_ttl_seconds(),
        allowed_algs: config.dpop_allowed_algs.clone(),
    }
}

pub fn build_dpop_verifier(config: &Config, replay_store: Arc<dyn ReplayStore>) -> DpopVerifier {
    DpopVerifier::new(dpop_policy(config), replay_store)
}
