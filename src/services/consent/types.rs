use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::open_finance::Scope;

/// Consent record as owned by the consent-management system. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub consent_id: String,
    pub participant_id: String,
    // Customer (PSU) who granted the consent.
    pub psu_id: String,
    // As stored; unknown scope names never grant anything.
    pub scopes: BTreeSet<String>,
    pub authorized_resource_ids: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl Consent {
    pub fn grants(&self, scope: Scope) -> bool {
        self.scopes.iter().any(|s| s.parse::<Scope>() == Ok(scope))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of an allowed decision, valid for one request.
#[derive(Debug, Clone)]
pub struct ConsentContext {
    pub consent: Consent,
    pub participant_id: String,
    // Sorted; every id is in `consent.authorized_resource_ids`.
    pub resource_ids: Vec<String>,
}

/// Reasons a consent does not authorize the request. The messages are part of the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentDenial {
    #[error("consent not found")]
    NotFound,
    #[error("expired")]
    Expired,
    #[error("participant mismatch")]
    ParticipantMismatch,
    #[error("required scope missing")]
    ScopeMissing,
    // Same denial whether or not the resource exists at all.
    #[error("not linked to consent")]
    NotLinked,
    #[error("consent lookup failed")]
    LookupFailed,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Allowed(ConsentContext),
    Denied(ConsentDenial),
}

impl Decision {
    pub fn into_result(self) -> Result<ConsentContext, ConsentDenial> {
        match self {
            Decision::Allowed(ctx) => Ok(ctx),
            Decision::Denied(denial) => Err(denial),
        }
    }
}
