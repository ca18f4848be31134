/*
 * Responsibility
 * - insurance_policies テーブル向け SQLx 読み取り
 * - ResourceReadPort<InsurancePolicy> の Postgres 実装
 */
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoError;
use crate::services::open_finance::{InsurancePolicy, PortError, ResourceReadPort};

#[derive(Debug, FromRow)]
pub struct PolicyRow {
    #[sqlx(rename = "policyId")]
    pub policy_id: String,
    #[sqlx(rename = "policyNumber")]
    pub policy_number: String,
    #[sqlx(rename = "productType")]
    pub product_type: String,
    pub status: String,
    #[sqlx(rename = "insuredName")]
    pub insured_name: String,
    // numeric is read as text to keep the exact decimal representation
    #[sqlx(rename = "premiumAmount")]
    pub premium_amount: String,
    pub currency: String,
    #[sqlx(rename = "startDate")]
    pub start_date: NaiveDate,
    #[sqlx(rename = "endDate")]
    pub end_date: NaiveDate,
    #[sqlx(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<PolicyRow> for InsurancePolicy {
    fn from(row: PolicyRow) -> Self {
        InsurancePolicy {
            policy_id: row.policy_id,
            policy_number: row.policy_number,
            product_type: row.product_type,
            status: row.status,
            insured_name: row.insured_name,
            premium_amount: row.premium_amount,
            currency: row.currency,
            start_date: row.start_date,
            end_date: row.end_date,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = r#""policyId", "policyNumber", "productType", status, "insuredName",
    "premiumAmount"::text AS "premiumAmount", currency, "startDate", "endDate", "updatedAt""#;

pub async fn get(db: &PgPool, policy_id: &str) -> Result<Option<PolicyRow>, RepoError> {
    let sql = format!(r#"SELECT {COLUMNS} FROM insurance_policies WHERE "policyId" = $1"#);
    let row = sqlx::query_as::<_, PolicyRow>(&sql)
        .bind(policy_id)
        .fetch_optional(db)
        .await?;

    Ok(row)
}

pub async fn list_by_ids(db: &PgPool, policy_ids: &[String]) -> Result<Vec<PolicyRow>, RepoError> {
    let sql = format!(
        r#"SELECT {COLUMNS} FROM insurance_policies WHERE "policyId" = ANY($1) ORDER BY "policyId""#
    );
    let rows = sqlx::query_as::<_, PolicyRow>(&sql)
        .bind(policy_ids)
        .fetch_all(db)
        .await?;

    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct PgPolicyReadPort {
    db: PgPool,
}

impl PgPolicyReadPort {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResourceReadPort<InsurancePolicy> for PgPolicyReadPort {
    async fn find_resource_by_id(&self, id: &str) -> Result<Option<InsurancePolicy>, PortError> {
        Ok(get(&self.db, id).await?.map(InsurancePolicy::from))
    }

    async fn find_resources_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<InsurancePolicy>, PortError> {
        let rows = list_by_ids(&self.db, ids).await?;
        Ok(rows.into_iter().map(InsurancePolicy::from).collect())
    }
}
