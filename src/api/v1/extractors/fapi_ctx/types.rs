/*
 * Responsibility
 * - handler から見える「構文チェック済みリクエスト」の型
 * - pipeline へは AccessRequest (借用) として渡す
 */
use crate::services::open_finance::AccessRequest;

/// Headers of one Open Finance request, syntactically valid but not yet trusted.
///
/// - `access_token` / `proof` are unverified; the pipeline verifies both.
/// - `htu` is the absolute request URI without query, rebuilt from config or proxy headers.
#[derive(Debug, Clone)]
pub struct FapiCtx {
    pub access_token: String,
    pub proof: String,
    pub method: String,
    pub htu: String,
    pub interaction_id: String,
    pub participant_id: String,
    pub consent_id: String,
    pub if_none_match: Option<String>,
}

impl FapiCtx {
    pub fn as_request(&self) -> AccessRequest<'_> {
        AccessRequest {
            access_token: &self.access_token,
            proof: &self.proof,
            method: &self.method,
            htu: &self.htu,
            participant_id: &self.participant_id,
            consent_id: &self.consent_id,
            interaction_id: &self.interaction_id,
            if_none_match: self.if_none_match.as_deref(),
        }
    }
}
