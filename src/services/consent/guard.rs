//! Consent authorization.
//!
//! Decision order (first failing step wins):
//! 1. lookup miss          -> "consent not found"
//! 2. `expires_at <= now`  -> "expired"
//! 3. other participant    -> "participant mismatch"
//! 4. scope not granted    -> "required scope missing"
//! 5. id outside consent   -> "not linked to consent"
//!
//! Step 5 never consults the system of record, so an unknown id and someone else's id
//! are indistinguishable. Availability of a linked record is decided downstream.
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::services::consent::store::ConsentStore;
use crate::services::consent::types::{ConsentContext, ConsentDenial, Decision};
use crate::services::open_finance::Scope;

#[derive(Clone)]
pub struct ConsentGuard {
    store: Arc<dyn ConsentStore>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for ConsentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentGuard")
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl ConsentGuard {
    pub fn new(store: Arc<dyn ConsentStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// `requested: None` means "everything the consent links" (list endpoints).
    pub async fn authorize(
        &self,
        consent_id: &str,
        participant_id: &str,
        required_scope: Scope,
        requested: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Decision {
        // Lookup failures deny; authorization never fails open.
        let lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.store.find_consent_by_id(consent_id),
        )
        .await;
        let consent = match lookup {
            Ok(Ok(Some(consent))) => consent,
            Ok(Ok(None)) => return Decision::Denied(ConsentDenial::NotFound),
            Ok(Err(err)) => {
                warn!(error = ?err, consent_id, "consent lookup failed");
                return Decision::Denied(ConsentDenial::LookupFailed);
            }
            Err(_) => {
                warn!(consent_id, timeout = ?self.lookup_timeout, "consent lookup timed out");
                return Decision::Denied(ConsentDenial::LookupFailed);
            }
        };

        if consent.is_expired(now) {
            return Decision::Denied(ConsentDenial::Expired);
        }
        if consent.participant_id != participant_id {
            return Decision::Denied(ConsentDenial::ParticipantMismatch);
        }
        if !consent.grants(required_scope) {
            return Decision::Denied(ConsentDenial::ScopeMissing);
        }

        let mut resource_ids = match requested {
            Some(ids) => {
                if ids
                    .iter()
                    .any(|id| !consent.authorized_resource_ids.contains(id))
                {
                    return Decision::Denied(ConsentDenial::NotLinked);
                }
                ids.to_vec()
            }
            None => consent.authorized_resource_ids.iter().cloned().collect(),
        };
        resource_ids.sort();
        resource_ids.dedup();

        Decision::Allowed(ConsentContext {
            participant_id: participant_id.to_string(),
            resource_ids,
            consent,
        })
    }
}
