/*
 * Responsibility
 * - DB なしで動かすための in-memory port 実装 (tests / local 開発)
 * - 起動時に投入する fixture データ
 */
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::services::consent::{Consent, ConsentStore};
use crate::services::open_finance::{
    AccountDataReadPort, AccountScoped, OpenFinanceResource, PortError, ResourceReadPort,
};

#[derive(Debug, Default)]
pub struct InMemoryConsentStore {
    consents: RwLock<HashMap<String, Consent>>,
}

impl InMemoryConsentStore {
    pub fn with_consents(consents: impl IntoIterator<Item = Consent>) -> Self {
        let store = Self::default();
        for consent in consents {
            store.insert(consent);
        }
        store
    }

    pub fn insert(&self, consent: Consent) {
        self.consents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(consent.consent_id.clone(), consent);
    }
}

#[async_trait]
impl ConsentStore for InMemoryConsentStore {
    async fn find_consent_by_id(&self, consent_id: &str) -> Result<Option<Consent>, PortError> {
        Ok(self
            .consents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(consent_id)
            .cloned())
    }
}

/// Records of one resource kind, keyed by id. Counts read-port calls so tests can
/// observe cache hits and the absence of reads on denied requests.
#[derive(Debug)]
pub struct InMemoryResourceStore<T> {
    records: RwLock<BTreeMap<String, T>>,
    calls: AtomicUsize,
}

impl<T> Default for InMemoryResourceStore<T> {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T: OpenFinanceResource> InMemoryResourceStore<T> {
    pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: T) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.resource_id().to_string(), record);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: OpenFinanceResource> ResourceReadPort<T> for InMemoryResourceStore<T> {
    async fn find_resource_by_id(&self, id: &str) -> Result<Option<T>, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned())
    }

    async fn find_resources_by_ids(&self, ids: &[String]) -> Result<Vec<T>, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}

/// Per-account data (balances, transactions) grouped by account id.
#[derive(Debug)]
pub struct InMemoryAccountDataStore<C> {
    by_account: RwLock<BTreeMap<String, Vec<C>>>,
    calls: AtomicUsize,
}

impl<C> Default for InMemoryAccountDataStore<C> {
    fn default() -> Self {
        Self {
            by_account: RwLock::new(BTreeMap::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<C: AccountScoped> InMemoryAccountDataStore<C> {
    pub fn with_records(records: impl IntoIterator<Item = C>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: C) {
        self.by_account
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(record.account_id().to_string())
            .or_default()
            .push(record);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: AccountScoped> AccountDataReadPort<C> for InMemoryAccountDataStore<C> {
    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<C>, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .by_account
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Seed data: consents of participant `TPP-001` (granted by `PSU-001`) and the
/// records they link.
pub mod fixtures {
    use chrono::{DateTime, NaiveDate, Utc};

    use crate::services::consent::Consent;
    use crate::services::open_finance::{Account, Balance, InsurancePolicy, Transaction};

    pub const PARTICIPANT: &str = "TPP-001";
    pub const PSU: &str = "PSU-001";

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    fn consent(id: &str, scopes: &[&str], resources: &[&str], expires_at: &str) -> Consent {
        Consent {
            consent_id: id.to_string(),
            participant_id: PARTICIPANT.to_string(),
            psu_id: PSU.to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            authorized_resource_ids: resources.iter().map(|s| s.to_string()).collect(),
            expires_at: at(expires_at),
        }
    }

    pub fn consents() -> Vec<Consent> {
        vec![
            consent(
                "CONS-INS-001",
                &["ReadPolicies"],
                &["POL-MTR-001", "POL-MTR-002"],
                "2099-12-31T23:59:59Z",
            ),
            consent(
                "CONS-INS-EXPIRED",
                &["ReadPolicies"],
                &["POL-MTR-001"],
                "2026-01-01T00:00:00Z",
            ),
            consent(
                "CONS-INS-RO",
                &["ReadBalances"],
                &["POL-MTR-001"],
                "2099-12-31T23:59:59Z",
            ),
            consent(
                "CONS-INS-INACTIVE",
                &["ReadPolicies"],
                &["POL-MTR-003"],
                "2099-12-31T23:59:59Z",
            ),
            // ACC-004 is linked but belongs to another PSU.
            consent(
                "CONS-AIS-001",
                &["ReadAccounts", "ReadBalances", "ReadTransactions"],
                &["ACC-001", "ACC-002", "ACC-003", "ACC-004"],
                "2099-12-31T23:59:59Z",
            ),
            consent(
                "CONS-AIS-BAL",
                &["ReadAccounts", "ReadBalances"],
                &["ACC-001"],
                "2099-12-31T23:59:59Z",
            ),
        ]
    }

    fn policy(id: &str, number: &str, status: &str, insured: &str, premium: &str) -> InsurancePolicy {
        InsurancePolicy {
            policy_id: id.to_string(),
            policy_number: number.to_string(),
            product_type: "MOTOR".to_string(),
            status: status.to_string(),
            insured_name: insured.to_string(),
            premium_amount: premium.to_string(),
            currency: "AED".to_string(),
            start_date: day(2025, 3, 1),
            end_date: day(2026, 2, 28),
            updated_at: at("2026-01-15T08:00:00Z"),
        }
    }

    pub fn policies() -> Vec<InsurancePolicy> {
        vec![
            policy("POL-MTR-001", "MTR-2025-0001", "ACTIVE", "Ahmed Al Mansoori", "2450.00"),
            policy("POL-MTR-002", "MTR-2025-0002", "ACTIVE", "Ahmed Al Mansoori", "1875.50"),
            policy("POL-MTR-003", "MTR-2024-0913", "LAPSED", "Sara Haddad", "3120.00"),
        ]
    }

    fn account(id: &str, psu: &str, kind: &str, status: &str, masked: &str) -> Account {
        Account {
            account_id: id.to_string(),
            psu_id: psu.to_string(),
            account_type: kind.to_string(),
            status: status.to_string(),
            nickname: None,
            currency: "AED".to_string(),
            masked_number: masked.to_string(),
            updated_at: at("2026-01-20T12:00:00Z"),
        }
    }

    pub fn accounts() -> Vec<Account> {
        vec![
            account("ACC-001", PSU, "CURRENT", "ENABLED", "****1001"),
            account("ACC-002", PSU, "SAVINGS", "ENABLED", "****1002"),
            account("ACC-003", PSU, "CURRENT", "CLOSED", "****1003"),
            account("ACC-004", "PSU-999", "CURRENT", "ENABLED", "****1004"),
        ]
    }

    fn balance(account: &str, kind: &str, amount: &str) -> Balance {
        Balance {
            account_id: account.to_string(),
            balance_type: kind.to_string(),
            amount: amount.to_string(),
            currency: "AED".to_string(),
            date_time: at("2026-02-09T09:00:00Z"),
        }
    }

    pub fn balances() -> Vec<Balance> {
        vec![
            balance("ACC-001", "InterimAvailable", "100.00"),
            balance("ACC-001", "InterimBooked", "99.00"),
            balance("ACC-002", "InterimAvailable", "2500.50"),
            balance("ACC-004", "InterimAvailable", "7.00"),
        ]
    }

    fn transaction(id: &str, account: &str, booked: &str, amount: &str, merchant: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: account.to_string(),
            amount: amount.to_string(),
            currency: "AED".to_string(),
            booking_date_time: at(booked),
            value_date_time: at(booked),
            credit_debit_indicator: "Debit".to_string(),
            status: "Booked".to_string(),
            merchant_name: Some(merchant.to_string()),
        }
    }

    pub fn transactions() -> Vec<Transaction> {
        vec![
            transaction("TXN-1", "ACC-001", "2026-01-10T00:00:00Z", "10.00", "Carrefour"),
            transaction("TXN-2", "ACC-001", "2026-01-05T00:00:00Z", "45.25", "ENOC"),
            transaction("TXN-3", "ACC-001", "2025-12-30T00:00:00Z", "120.00", "Noon"),
            transaction("TXN-4", "ACC-002", "2026-02-01T00:00:00Z", "5.00", "Talabat"),
        ]
    }
}
