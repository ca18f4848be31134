use async_trait::async_trait;

use crate::services::consent::types::Consent;
use crate::services::open_finance::PortError;

/// Consent lookup port. Implementations must not filter by expiry or participant;
/// the guard owns those decisions.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn find_consent_by_id(&self, consent_id: &str) -> Result<Option<Consent>, PortError>;
}
