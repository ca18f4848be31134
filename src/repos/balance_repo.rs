/*
 * Responsibility
 * - balances テーブル向け SQLx 読み取り (account 単位)
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoError;
use crate::services::open_finance::{AccountDataReadPort, Balance, PortError};

#[derive(Debug, FromRow)]
pub struct BalanceRow {
    #[sqlx(rename = "accountId")]
    pub account_id: String,
    #[sqlx(rename = "balanceType")]
    pub balance_type: String,
    pub amount: String,
    pub currency: String,
    #[sqlx(rename = "dateTime")]
    pub date_time: DateTime<Utc>,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Balance {
            account_id: row.account_id,
            balance_type: row.balance_type,
            amount: row.amount,
            currency: row.currency,
            date_time: row.date_time,
        }
    }
}

pub async fn list_by_account(db: &PgPool, account_id: &str) -> Result<Vec<BalanceRow>, RepoError> {
    // amount is NUMERIC; text keeps the exact decimal.
    let rows = sqlx::query_as::<_, BalanceRow>(
        r#"
        SELECT "accountId", "balanceType", amount::text AS amount, currency, "dateTime"
        FROM balances
        WHERE "accountId" = $1
        ORDER BY "balanceType"
        "#,
    )
    .bind(account_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct PgBalanceReadPort {
    db: PgPool,
}

impl PgBalanceReadPort {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountDataReadPort<Balance> for PgBalanceReadPort {
    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Balance>, PortError> {
        let rows = list_by_account(&self.db, account_id).await?;
        Ok(rows.into_iter().map(Balance::from).collect())
    }
}
