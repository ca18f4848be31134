use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::services::open_finance::PortError;

/// Capability names a consent can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    ReadAccounts,
    ReadBalances,
    ReadPolicies,
    ReadTransactions,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::ReadAccounts => "ReadAccounts",
            Scope::ReadBalances => "ReadBalances",
            Scope::ReadPolicies => "ReadPolicies",
            Scope::ReadTransactions => "ReadTransactions",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Scope::ReadAccounts,
            Scope::ReadBalances,
            Scope::ReadPolicies,
            Scope::ReadTransactions,
        ]
        .into_iter()
        .find(|scope| scope.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or(())
    }
}

/// A record type served through the access pipeline.
pub trait OpenFinanceResource:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    // Used in cache keys and logs.
    const KIND: &'static str;
    // Capability a consent must grant to read this kind.
    const REQUIRED_SCOPE: Scope;

    fn resource_id(&self) -> &str;

    // Authorized-but-unavailable records surface as ResourceNotFound.
    fn is_available(&self) -> bool;

    // PSU that owns the record, for kinds that have one. A record owned by someone
    // other than the consent's PSU is treated as not linked.
    fn owner_psu_id(&self) -> Option<&str> {
        None
    }
}

/// Read side of the system of record for one resource kind.
#[async_trait]
pub trait ResourceReadPort<T: OpenFinanceResource>: Send + Sync {
    async fn find_resource_by_id(&self, id: &str) -> Result<Option<T>, PortError>;

    // Unknown ids are simply absent from the result.
    async fn find_resources_by_ids(&self, ids: &[String]) -> Result<Vec<T>, PortError>;
}

/// Data that hangs off one account (balances, transactions). Access is decided on the
/// parent account: the consent must link it and its PSU must own it.
pub trait AccountScoped: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;
    const REQUIRED_SCOPE: Scope;

    fn account_id(&self) -> &str;
}

#[async_trait]
pub trait AccountDataReadPort<C: AccountScoped>: Send + Sync {
    // An account without data yields an empty list, never an error.
    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<C>, PortError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsurancePolicy {
    pub policy_id: String,
    pub policy_number: String,
    pub product_type: String,
    pub status: String,
    pub insured_name: String,
    pub premium_amount: String,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl OpenFinanceResource for InsurancePolicy {
    const KIND: &'static str = "insurance-policies";
    const REQUIRED_SCOPE: Scope = Scope::ReadPolicies;

    fn resource_id(&self) -> &str {
        &self.policy_id
    }

    fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub psu_id: String,
    pub account_type: String,
    pub status: String,
    pub nickname: Option<String>,
    pub currency: String,
    pub masked_number: String,
    pub updated_at: DateTime<Utc>,
}

impl OpenFinanceResource for Account {
    const KIND: &'static str = "accounts";
    const REQUIRED_SCOPE: Scope = Scope::ReadAccounts;

    fn resource_id(&self) -> &str {
        &self.account_id
    }

    fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case("ENABLED")
    }

    fn owner_psu_id(&self) -> Option<&str> {
        Some(&self.psu_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub account_id: String,
    // InterimAvailable, InterimBooked, ...
    pub balance_type: String,
    pub amount: String,
    pub currency: String,
    pub date_time: DateTime<Utc>,
}

impl AccountScoped for Balance {
    const KIND: &'static str = "balances";
    const REQUIRED_SCOPE: Scope = Scope::ReadBalances;

    fn account_id(&self) -> &str {
        &self.account_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: String,
    pub currency: String,
    pub booking_date_time: DateTime<Utc>,
    pub value_date_time: DateTime<Utc>,
    pub credit_debit_indicator: String,
    pub status: String,
    pub merchant_name: Option<String>,
}

impl AccountScoped for Transaction {
    const KIND: &'static str = "transactions";
    const REQUIRED_SCOPE: Scope = Scope::ReadTransactions;

    fn account_id(&self) -> &str {
        &self.account_id
    }
}

/// Inclusive booking-time range for transaction queries. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl BookingWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}
