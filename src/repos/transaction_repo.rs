/*
 * Responsibility
 * - transactions テーブル向け SQLx 読み取り (account 単位)
 * - 期間 filter / paging は pipeline 側 (cache された全件に対して行う)
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoError;
use crate::services::open_finance::{AccountDataReadPort, PortError, Transaction};

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    #[sqlx(rename = "transactionId")]
    pub transaction_id: String,
    #[sqlx(rename = "accountId")]
    pub account_id: String,
    pub amount: String,
    pub currency: String,
    #[sqlx(rename = "bookingDateTime")]
    pub booking_date_time: DateTime<Utc>,
    #[sqlx(rename = "valueDateTime")]
    pub value_date_time: DateTime<Utc>,
    #[sqlx(rename = "creditDebitIndicator")]
    pub credit_debit_indicator: String,
    pub status: String,
    #[sqlx(rename = "merchantName")]
    pub merchant_name: Option<String>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            transaction_id: row.transaction_id,
            account_id: row.account_id,
            amount: row.amount,
            currency: row.currency,
            booking_date_time: row.booking_date_time,
            value_date_time: row.value_date_time,
            credit_debit_indicator: row.credit_debit_indicator,
            status: row.status,
            merchant_name: row.merchant_name,
        }
    }
}

pub async fn list_by_account(
    db: &PgPool,
    account_id: &str,
) -> Result<Vec<TransactionRow>, RepoError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT "transactionId", "accountId", amount::text AS amount, currency,
               "bookingDateTime", "valueDateTime", "creditDebitIndicator", status, "merchantName"
        FROM transactions
        WHERE "accountId" = $1
        ORDER BY "bookingDateTime" DESC, "transactionId"
        "#,
    )
    .bind(account_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct PgTransactionReadPort {
    db: PgPool,
}

impl PgTransactionReadPort {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountDataReadPort<Transaction> for PgTransactionReadPort {
    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Transaction>, PortError> {
        let rows = list_by_account(&self.db, account_id).await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }
}
