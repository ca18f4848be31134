/*
 * Responsibility
 * - accounts テーブル向け SQLx 読み取り
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoError;
use crate::services::open_finance::{Account, PortError, ResourceReadPort};

#[derive(Debug, FromRow)]
pub struct AccountRow {
    #[sqlx(rename = "accountId")]
    pub account_id: String,
    #[sqlx(rename = "psuId")]
    pub psu_id: String,
    #[sqlx(rename = "accountType")]
    pub account_type: String,
    pub status: String,
    pub nickname: Option<String>,
    pub currency: String,
    #[sqlx(rename = "maskedNumber")]
    pub masked_number: String,
    #[sqlx(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            account_id: row.account_id,
            psu_id: row.psu_id,
            account_type: row.account_type,
            status: row.status,
            nickname: row.nickname,
            currency: row.currency,
            masked_number: row.masked_number,
            updated_at: row.updated_at,
        }
    }
}

pub async fn get(db: &PgPool, account_id: &str) -> Result<Option<AccountRow>, RepoError> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT "accountId", "psuId", "accountType", status, nickname, currency, "maskedNumber", "updatedAt"
        FROM accounts
        WHERE "accountId" = $1
        "#,
    )
    .bind(account_id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

pub async fn list_by_ids(db: &PgPool, account_ids: &[String]) -> Result<Vec<AccountRow>, RepoError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT "accountId", "psuId", "accountType", status, nickname, currency, "maskedNumber", "updatedAt"
        FROM accounts
        WHERE "accountId" = ANY($1)
        ORDER BY "accountId"
        "#,
    )
    .bind(account_ids)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct PgAccountReadPort {
    db: PgPool,
}

impl PgAccountReadPort {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResourceReadPort<Account> for PgAccountReadPort {
    async fn find_resource_by_id(&self, id: &str) -> Result<Option<Account>, PortError> {
        Ok(get(&self.db, id).await?.map(Account::from))
    }

    async fn find_resources_by_ids(&self, ids: &[String]) -> Result<Vec<Account>, PortError> {
        let rows = list_by_ids(&self.db, ids).await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }
}
