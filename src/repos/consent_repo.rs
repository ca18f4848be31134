/*
 * Responsibility
 * - consents テーブル向け SQLx 読み取り (consent 管理側が書き込む)
 * - ConsentStore port の Postgres 実装
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoError;
use crate::services::consent::{Consent, ConsentStore};
use crate::services::open_finance::PortError;

#[derive(Debug, FromRow)]
pub struct ConsentRow {
    #[sqlx(rename = "consentId")]
    pub consent_id: String,
    #[sqlx(rename = "participantId")]
    pub participant_id: String,
    #[sqlx(rename = "psuId")]
    pub psu_id: String,
    pub scopes: Vec<String>,
    #[sqlx(rename = "resourceIds")]
    pub resource_ids: Vec<String>,
    #[sqlx(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl From<ConsentRow> for Consent {
    fn from(row: ConsentRow) -> Self {
        Consent {
            consent_id: row.consent_id,
            participant_id: row.participant_id,
            psu_id: row.psu_id,
            scopes: row.scopes.into_iter().collect(),
            authorized_resource_ids: row.resource_ids.into_iter().collect(),
            expires_at: row.expires_at,
        }
    }
}

pub async fn get(db: &PgPool, consent_id: &str) -> Result<Option<ConsentRow>, RepoError> {
    // No status / expiry filter: the guard decides.
    let row = sqlx::query_as::<_, ConsentRow>(
        r#"
        SELECT "consentId", "participantId", "psuId", scopes, "resourceIds", "expiresAt"
        FROM consents
        WHERE "consentId" = $1
        "#,
    )
    .bind(consent_id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

#[derive(Debug, Clone)]
pub struct PgConsentStore {
    db: PgPool,
}

impl PgConsentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConsentStore for PgConsentStore {
    async fn find_consent_by_id(&self, consent_id: &str) -> Result<Option<Consent>, PortError> {
        Ok(get(&self.db, consent_id).await?.map(Consent::from))
    }
}
