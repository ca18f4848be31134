//! Per-request access flow for Open Finance reads.
//!
//! access token → DPoP proof → participant binding → consent decision → read-through cache
//! → PSU ownership → conditional check.
//! Any failure aborts the request; nothing is read or cached before the consent allows it.
use std::{future::Future, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::services::auth::AuthService;
use crate::services::auth::dpop::{DpopVerifier, ProofTarget};
use crate::services::cache::{
    Cached, Page, PageRequest, ReadThroughCache, derive_tag, if_none_match_matches, paginate,
};
use crate::services::consent::{ConsentContext, ConsentDenial, ConsentGuard, Decision};
use crate::services::open_finance::{
    Account, AccountDataReadPort, AccountScoped, Balance, BookingWindow, OpenFinanceResource,
    PortError, ResourceReadPort, Scope, Transaction,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cache_ttl: TimeDelta,
    pub default_page_size: u32,
    pub max_page_size: u32,
    // Deadline for one read-port call.
    pub read_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::seconds(30),
            default_page_size: 100,
            max_page_size: 100,
            read_timeout: Duration::from_secs(3),
        }
    }
}

/// Everything the pipeline needs from one HTTP request, already extracted.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub access_token: &'a str,
    pub proof: &'a str,
    pub method: &'a str,
    // Absolute URI the proof must be bound to.
    pub htu: &'a str,
    pub participant_id: &'a str,
    pub consent_id: &'a str,
    pub interaction_id: &'a str,
    pub if_none_match: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum ServeOutcome<T> {
    Fresh {
        value: T,
        cache_hit: bool,
        entity_tag: String,
    },
    NotModified {
        cache_hit: bool,
        entity_tag: String,
    },
}

impl<T> ServeOutcome<T> {
    pub fn cache_hit(&self) -> bool {
        match self {
            ServeOutcome::Fresh { cache_hit, .. } | ServeOutcome::NotModified { cache_hit, .. } => {
                *cache_hit
            }
        }
    }

    pub fn entity_tag(&self) -> &str {
        match self {
            ServeOutcome::Fresh { entity_tag, .. }
            | ServeOutcome::NotModified { entity_tag, .. } => entity_tag,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessPipeline {
    auth: AuthService,
    dpop: DpopVerifier,
    guard: ConsentGuard,
    cache: ReadThroughCache,
    settings: PipelineSettings,
}

impl AccessPipeline {
    pub fn new(
        auth: AuthService,
        dpop: DpopVerifier,
        guard: ConsentGuard,
        cache: ReadThroughCache,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            auth,
            dpop,
            guard,
            cache,
            settings,
        }
    }

    /// 1-based page parameters; missing values fall back to the defaults.
    pub fn page_request(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<PageRequest, AppError> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(self.settings.default_page_size);

        if page < 1 {
            return Err(AppError::invalid_request("page must be >= 1"));
        }
        if page_size < 1 || page_size > self.settings.max_page_size {
            return Err(AppError::invalid_request(format!(
                "pageSize must be between 1 and {}",
                self.settings.max_page_size
            )));
        }

        Ok(PageRequest { page, page_size })
    }

    /// Single record read. The id must be linked to the consent; a linked record that is
    /// missing or unavailable is `ResourceNotFound`.
    pub async fn read_item<T: OpenFinanceResource>(
        &self,
        req: &AccessRequest<'_>,
        id: &str,
        port: &dyn ResourceReadPort<T>,
        now: DateTime<Utc>,
    ) -> Result<ServeOutcome<T>, AppError> {
        let requested = [id.to_string()];
        let ctx = self
            .admit(req, T::REQUIRED_SCOPE, Some(&requested[..]), now)
            .await?;

        let cached = self.load_linked(req, &ctx, id, port, now).await?;
        let (value, cache_hit, entity_tag) = (cached.value, cached.cache_hit, cached.entity_tag);
        Ok(conditional(req.if_none_match, entity_tag, cache_hit, || value))
    }

    /// One page of every available record the consent links, ordered by id.
    pub async fn read_page<T: OpenFinanceResource>(
        &self,
        req: &AccessRequest<'_>,
        page: PageRequest,
        port: &dyn ResourceReadPort<T>,
        now: DateTime<Utc>,
    ) -> Result<ServeOutcome<Page<T>>, AppError> {
        let ctx = self.admit(req, T::REQUIRED_SCOPE, None, now).await?;
        let psu_id = ctx.consent.psu_id;
        let ids = ctx.resource_ids;

        // Keyed by the linked id set, so a consent change never reads a stale set.
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let set_digest = derive_tag(&id_refs);
        let key = self
            .cache
            .key(&[T::KIND, "list", set_digest.trim_matches('"')]);

        let read_timeout = self.settings.read_timeout;
        let ids_ref = &ids;
        let cached = self
            .cache
            .get_or_compute(&key, self.settings.cache_ttl, now, || async move {
                bounded(read_timeout, T::KIND, port.find_resources_by_ids(ids_ref))
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        // The tag of a page depends on the cached set, the PSU and the page window.
        let (page_no, page_size) = (page.page.to_string(), page.page_size.to_string());
        let page_tag = derive_tag(&[
            cached.entity_tag.as_str(),
            psu_id.as_str(),
            page_no.as_str(),
            page_size.as_str(),
        ]);

        let records = cached.value;
        Ok(conditional(
            req.if_none_match,
            page_tag,
            cached.cache_hit,
            || {
                let mut visible: Vec<T> = records
                    .into_iter()
                    .filter(|r| {
                        ids.binary_search_by(|id| id.as_str().cmp(r.resource_id()))
                            .is_ok()
                            && r.owner_psu_id().is_none_or(|owner| owner == psu_id)
                            && r.is_available()
                    })
                    .collect();
                visible.sort_by(|a, b| a.resource_id().cmp(b.resource_id()));
                paginate(&visible, page)
            },
        ))
    }

    /// Every balance of one consented account.
    pub async fn read_balances(
        &self,
        req: &AccessRequest<'_>,
        account_id: &str,
        accounts: &dyn ResourceReadPort<Account>,
        balances: &dyn AccountDataReadPort<Balance>,
        now: DateTime<Utc>,
    ) -> Result<ServeOutcome<Vec<Balance>>, AppError> {
        let cached = self
            .account_data(req, account_id, accounts, balances, now)
            .await?;

        let (value, cache_hit, entity_tag) = (cached.value, cached.cache_hit, cached.entity_tag);
        Ok(conditional(req.if_none_match, entity_tag, cache_hit, || value))
    }

    /// One page of an account's transactions booked inside `window`, newest first.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_transactions(
        &self,
        req: &AccessRequest<'_>,
        account_id: &str,
        window: BookingWindow,
        page: PageRequest,
        accounts: &dyn ResourceReadPort<Account>,
        transactions: &dyn AccountDataReadPort<Transaction>,
        now: DateTime<Utc>,
    ) -> Result<ServeOutcome<Page<Transaction>>, AppError> {
        if window.is_inverted() {
            return Err(AppError::invalid_request(
                "fromBookingDateTime must not be after toBookingDateTime",
            ));
        }

        let cached = self
            .account_data(req, account_id, accounts, transactions, now)
            .await?;

        let bound = |at: Option<DateTime<Utc>>| at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let (from, to) = (bound(window.from), bound(window.to));
        let (page_no, page_size) = (page.page.to_string(), page.page_size.to_string());
        let page_tag = derive_tag(&[
            cached.entity_tag.as_str(),
            from.as_str(),
            to.as_str(),
            page_no.as_str(),
            page_size.as_str(),
        ]);

        let records = cached.value;
        Ok(conditional(
            req.if_none_match,
            page_tag,
            cached.cache_hit,
            || {
                let mut booked: Vec<Transaction> = records
                    .into_iter()
                    .filter(|t| window.contains(t.booking_date_time))
                    .collect();
                booked.sort_by(|a, b| {
                    b.booking_date_time
                        .cmp(&a.booking_date_time)
                        .then_with(|| a.transaction_id.cmp(&b.transaction_id))
                });
                paginate(&booked, page)
            },
        ))
    }

    // Admission is decided on the parent account; the data itself is cached per account.
    async fn account_data<C: AccountScoped>(
        &self,
        req: &AccessRequest<'_>,
        account_id: &str,
        accounts: &dyn ResourceReadPort<Account>,
        data: &dyn AccountDataReadPort<C>,
        now: DateTime<Utc>,
    ) -> Result<Cached<Vec<C>>, AppError> {
        let requested = [account_id.to_string()];
        let ctx = self
            .admit(req, C::REQUIRED_SCOPE, Some(&requested[..]), now)
            .await?;

        self.load_linked(req, &ctx, account_id, accounts, now)
            .await?;

        let key = self.cache.key(&[C::KIND, "account", account_id]);
        let read_timeout = self.settings.read_timeout;
        self.cache
            .get_or_compute(&key, self.settings.cache_ttl, now, || async move {
                let mut records =
                    bounded(read_timeout, C::KIND, data.find_by_account_id(account_id)).await?;
                records.retain(|r| r.account_id() == account_id);
                Ok::<_, AppError>(records)
            })
            .await
    }

    // Cached read of one linked record, then the PSU and availability checks.
    async fn load_linked<T: OpenFinanceResource>(
        &self,
        req: &AccessRequest<'_>,
        ctx: &ConsentContext,
        id: &str,
        port: &dyn ResourceReadPort<T>,
        now: DateTime<Utc>,
    ) -> Result<Cached<T>, AppError> {
        let key = self.cache.key(&[T::KIND, "item", id]);
        let read_timeout = self.settings.read_timeout;
        let cached = self
            .cache
            .get_or_compute(&key, self.settings.cache_ttl, now, || async move {
                // Absence is not cached.
                let found = bounded(read_timeout, T::KIND, port.find_resource_by_id(id)).await?;
                found.ok_or_else(not_found)
            })
            .await?;

        if let Some(owner) = cached.value.owner_psu_id()
            && owner != ctx.consent.psu_id
        {
            warn!(
                interaction_id = req.interaction_id,
                consent_id = req.consent_id,
                kind = T::KIND,
                resource_id = id,
                "resource belongs to another PSU"
            );
            return Err(ConsentDenial::NotLinked.into());
        }

        if !cached.value.is_available() {
            debug!(
                interaction_id = req.interaction_id,
                kind = T::KIND,
                resource_id = id,
                "linked resource is not available"
            );
            return Err(not_found());
        }

        Ok(cached)
    }

    // Token, proof and consent. Every rejection is a security event.
    async fn admit(
        &self,
        req: &AccessRequest<'_>,
        scope: Scope,
        requested: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<ConsentContext, AppError> {
        let token = self
            .auth
            .verify_verified(req.access_token, now)
            .map_err(|e| {
                warn!(interaction_id = req.interaction_id, reason = %e, "access token rejected");
                AppError::from(e)
            })?;

        let target = ProofTarget {
            method: req.method,
            uri: req.htu,
        };
        self.dpop
            .validate(
                req.proof,
                target,
                Some(req.access_token),
                token.cnf_jkt.as_deref(),
                now,
            )
            .await
            .map_err(|e| {
                warn!(interaction_id = req.interaction_id, reason = %e, "DPoP proof rejected");
                AppError::from(e)
            })?;

        // The token must belong to the participant named in the request headers.
        if token.participant_id() != req.participant_id {
            warn!(
                interaction_id = req.interaction_id,
                token_participant = token.participant_id(),
                participant_id = req.participant_id,
                "token issued to another participant"
            );
            return Err(ConsentDenial::ParticipantMismatch.into());
        }

        match self
            .guard
            .authorize(req.consent_id, req.participant_id, scope, requested, now)
            .await
        {
            Decision::Allowed(ctx) => Ok(ctx),
            Decision::Denied(denial) => {
                warn!(
                    interaction_id = req.interaction_id,
                    consent_id = req.consent_id,
                    participant_id = req.participant_id,
                    reason = %denial,
                    "consent denied"
                );
                Err(denial.into())
            }
        }
    }
}

fn not_found() -> AppError {
    AppError::ResourceNotFound("resource not found".into())
}

fn conditional<T>(
    if_none_match: Option<&str>,
    entity_tag: String,
    cache_hit: bool,
    build: impl FnOnce() -> T,
) -> ServeOutcome<T> {
    match if_none_match {
        Some(header) if if_none_match_matches(header, &entity_tag) => ServeOutcome::NotModified {
            cache_hit,
            entity_tag,
        },
        _ => ServeOutcome::Fresh {
            value: build(),
            cache_hit,
            entity_tag,
        },
    }
}

async fn bounded<T>(
    limit: Duration,
    kind: &'static str,
    call: impl Future<Output = Result<T, PortError>>,
) -> Result<T, PortError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(error = ?err, kind, "read port failed");
            Err(err)
        }
        Err(_) => {
            warn!(kind, timeout = ?limit, "read port timed out");
            Err(PortError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use ed25519_dalek::{Signer, SigningKey};
    use jsonwebtoken::{DecodingKey, jwk::Jwk};
    use serde_json::{Value, json};

    use crate::repos::memory::{
        InMemoryAccountDataStore, InMemoryConsentStore, InMemoryResourceStore, fixtures,
    };
    use crate::services::auth::dpop::{DpopPolicy, compute_ath, thumbprint};
    use crate::services::auth::replay::CacheReplayStore;
    use crate::services::cache::InMemoryCacheClient;
    use crate::services::consent::Consent;
    use crate::services::open_finance::InsurancePolicy;

    const BASE: &str = "https://api.example.com/open-finance/v1";

    fn now() -> DateTime<Utc> {
        "2026-02-09T10:15:30Z".parse().unwrap()
    }

    fn sign(key: &SigningKey, header: &Value, claims: &Value) -> String {
        let h = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
        let c = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let input = format!("{h}.{c}");
        format!(
            "{input}.{}",
            URL_SAFE_NO_PAD.encode(key.sign(input.as_bytes()).to_bytes())
        )
    }

    struct Harness {
        pipeline: AccessPipeline,
        consents: Arc<InMemoryConsentStore>,
        policies: Arc<InMemoryResourceStore<InsurancePolicy>>,
        accounts: Arc<InMemoryResourceStore<Account>>,
        balances: Arc<InMemoryAccountDataStore<Balance>>,
        transactions: Arc<InMemoryAccountDataStore<Transaction>>,
        read_cache: Arc<InMemoryCacheClient>,
        issuer_key: SigningKey,
        client_key: SigningKey,
        token: String,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(PipelineSettings::default())
        }

        fn with_settings(settings: PipelineSettings) -> Self {
            let issuer_key = SigningKey::from_bytes(&[7; 32]);
            let client_key = SigningKey::from_bytes(&[9; 32]);

            let issuer_x = URL_SAFE_NO_PAD.encode(issuer_key.verifying_key().as_bytes());
            let auth = AuthService::from_decoding_key(
                DecodingKey::from_ed_components(&issuer_x).unwrap(),
                "https://auth.example.com",
                "open-finance-api",
                60,
            );

            let token = Self::mint(&issuer_key, &client_key, None);

            let replay = CacheReplayStore::new(Arc::new(InMemoryCacheClient::new()), "dpop:replay");
            let dpop = DpopVerifier::new(DpopPolicy::default(), Arc::new(replay));
            let consents = Arc::new(InMemoryConsentStore::with_consents(fixtures::consents()));
            let guard = ConsentGuard::new(consents.clone(), Duration::from_secs(1));
            let read_cache = Arc::new(InMemoryCacheClient::new());
            let cache = ReadThroughCache::new(read_cache.clone(), "of", Duration::from_millis(200));

            Self {
                pipeline: AccessPipeline::new(auth, dpop, guard, cache, settings),
                consents,
                policies: Arc::new(InMemoryResourceStore::with_records(fixtures::policies())),
                accounts: Arc::new(InMemoryResourceStore::with_records(fixtures::accounts())),
                balances: Arc::new(InMemoryAccountDataStore::with_records(fixtures::balances())),
                transactions: Arc::new(InMemoryAccountDataStore::with_records(
                    fixtures::transactions(),
                )),
                read_cache,
                issuer_key,
                client_key,
                token,
            }
        }

        // Access token for the client key; `sub` is always TPP-001.
        fn mint(issuer_key: &SigningKey, client_key: &SigningKey, client_id: Option<&str>) -> String {
            let jwk: Jwk = serde_json::from_value(Self::client_jwk(client_key)).unwrap();
            let mut claims = json!({
                "iss": "https://auth.example.com",
                "aud": "open-finance-api",
                "sub": "TPP-001",
                "exp": now().timestamp() + 3600,
                "cnf": { "jkt": thumbprint(&jwk).unwrap() },
            });
            if let Some(client_id) = client_id {
                claims["client_id"] = json!(client_id);
            }
            sign(issuer_key, &json!({ "alg": "EdDSA", "typ": "at+jwt" }), &claims)
        }

        fn client_jwk(key: &SigningKey) -> Value {
            json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "x": URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes()),
            })
        }

        fn proof(&self, htu: &str, at: DateTime<Utc>) -> String {
            self.proof_for(&self.token, htu, at)
        }

        fn proof_for(&self, token: &str, htu: &str, at: DateTime<Utc>) -> String {
            sign(
                &self.client_key,
                &json!({ "typ": "dpop+jwt", "alg": "EdDSA", "jwk": Self::client_jwk(&self.client_key) }),
                &json!({
                    "jti": uuid::Uuid::new_v4().to_string(),
                    "htm": "GET",
                    "htu": htu,
                    "iat": at.timestamp(),
                    "ath": compute_ath(token),
                }),
            )
        }

        async fn list(
            &self,
            consent: &str,
            page: PageRequest,
            if_none_match: Option<&str>,
            at: DateTime<Utc>,
        ) -> Result<ServeOutcome<Page<InsurancePolicy>>, AppError> {
            let htu = format!("{BASE}/insurance-policies");
            let proof = self.proof(&htu, at);
            let req = request(&self.token, &proof, &htu, consent, if_none_match);
            self.pipeline
                .read_page(&req, page, self.policies.as_ref(), at)
                .await
        }

        async fn item(
            &self,
            consent: &str,
            id: &str,
            port: &dyn ResourceReadPort<InsurancePolicy>,
        ) -> Result<ServeOutcome<InsurancePolicy>, AppError> {
            let htu = format!("{BASE}/insurance-policies/{id}");
            let proof = self.proof(&htu, now());
            let req = request(&self.token, &proof, &htu, consent, None);
            self.pipeline.read_item(&req, id, port, now()).await
        }

        async fn balances(
            &self,
            consent: &str,
            account_id: &str,
        ) -> Result<ServeOutcome<Vec<Balance>>, AppError> {
            let htu = format!("{BASE}/accounts/{account_id}/balances");
            let proof = self.proof(&htu, now());
            let req = request(&self.token, &proof, &htu, consent, None);
            self.pipeline
                .read_balances(&req, account_id, self.accounts.as_ref(), self.balances.as_ref(), now())
                .await
        }

        async fn transactions(
            &self,
            consent: &str,
            account_id: &str,
            window: BookingWindow,
            page: PageRequest,
        ) -> Result<ServeOutcome<Page<Transaction>>, AppError> {
            let htu = format!("{BASE}/accounts/{account_id}/transactions");
            let proof = self.proof(&htu, now());
            let req = request(&self.token, &proof, &htu, consent, None);
            self.pipeline
                .read_transactions(
                    &req,
                    account_id,
                    window,
                    page,
                    self.accounts.as_ref(),
                    self.transactions.as_ref(),
                    now(),
                )
                .await
        }
    }

    fn request<'a>(
        token: &'a str,
        proof: &'a str,
        htu: &'a str,
        consent: &'a str,
        if_none_match: Option<&'a str>,
    ) -> AccessRequest<'a> {
        AccessRequest {
            access_token: token,
            proof,
            method: "GET",
            htu,
            participant_id: "TPP-001",
            consent_id: consent,
            interaction_id: "8f2c4f8e-4c1b-4a57-9d47-3f7c1c2b9a10",
            if_none_match,
        }
    }

    fn first_page() -> PageRequest {
        PageRequest {
            page: 1,
            page_size: 10,
        }
    }

    fn fresh<T>(outcome: ServeOutcome<T>) -> (T, bool, String) {
        match outcome {
            ServeOutcome::Fresh {
                value,
                cache_hit,
                entity_tag,
            } => (value, cache_hit, entity_tag),
            ServeOutcome::NotModified { .. } => panic!("unexpected 304"),
        }
    }

    fn forbidden_message(err: AppError) -> String {
        match err {
            AppError::Forbidden(m) => m,
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_is_cached_until_ttl_elapses() {
        let h = Harness::new();

        let (page, hit, tag) = fresh(h.list("CONS-INS-001", first_page(), None, now()).await.unwrap());
        assert!(!hit);
        assert_eq!(page.total_records, 2);
        let ids: Vec<_> = page.items.iter().map(|p| p.policy_id.as_str()).collect();
        assert_eq!(ids, ["POL-MTR-001", "POL-MTR-002"]);

        let (_, hit, again) = fresh(h.list("CONS-INS-001", first_page(), None, now()).await.unwrap());
        assert!(hit);
        assert_eq!(tag, again);
        assert_eq!(h.policies.calls(), 1);

        let later = now() + TimeDelta::seconds(31);
        let (_, hit, _) = fresh(h.list("CONS-INS-001", first_page(), None, later).await.unwrap());
        assert!(!hit);
        assert_eq!(h.policies.calls(), 2);
    }

    #[tokio::test]
    async fn page_beyond_range_is_empty_with_true_total() {
        let h = Harness::new();
        let request = PageRequest {
            page: 5,
            page_size: 10,
        };
        let (page, _, _) = fresh(h.list("CONS-INS-001", request, None, now()).await.unwrap());
        assert!(page.items.is_empty());
        assert_eq!(page.total_records, 2);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn page_tags_differ_per_window() {
        let h = Harness::new();
        let one = PageRequest {
            page: 1,
            page_size: 1,
        };
        let two = PageRequest {
            page: 2,
            page_size: 1,
        };
        let (p1, _, t1) = fresh(h.list("CONS-INS-001", one, None, now()).await.unwrap());
        let (p2, _, t2) = fresh(h.list("CONS-INS-001", two, None, now()).await.unwrap());
        assert_ne!(t1, t2);
        assert_eq!(p1.items[0].policy_id, "POL-MTR-001");
        assert_eq!(p2.items[0].policy_id, "POL-MTR-002");
        assert_eq!(p1.next_page(), Some(2));
        assert_eq!(p2.next_page(), None);
    }

    #[tokio::test]
    async fn consent_denials_carry_their_reason() {
        let h = Harness::new();
        let cases = [
            ("CONS-NOPE", "consent not found"),
            ("CONS-INS-EXPIRED", "expired"),
            ("CONS-INS-RO", "required scope missing"),
        ];
        for (consent, reason) in cases {
            let err = h.list(consent, first_page(), None, now()).await.unwrap_err();
            assert_eq!(forbidden_message(err), reason, "{consent}");
        }
    }

    #[tokio::test]
    async fn denied_requests_never_read_or_cache() {
        let h = Harness::new();
        let _ = h.list("CONS-INS-RO", first_page(), None, now()).await.unwrap_err();
        let _ = h
            .item("CONS-INS-001", "POL-MTR-003", h.policies.as_ref())
            .await
            .unwrap_err();

        assert_eq!(h.policies.calls(), 0);
        assert!(h.read_cache.is_empty());
    }

    #[tokio::test]
    async fn foreign_and_unknown_ids_are_indistinguishable() {
        let h = Harness::new();
        let foreign = h
            .item("CONS-INS-001", "POL-MTR-003", h.policies.as_ref())
            .await
            .unwrap_err();
        let unknown = h
            .item("CONS-INS-001", "POL-404", h.policies.as_ref())
            .await
            .unwrap_err();

        assert_eq!(foreign.status(), unknown.status());
        assert_eq!(forbidden_message(foreign), "not linked to consent");
        assert_eq!(forbidden_message(unknown), "not linked to consent");
    }

    #[tokio::test]
    async fn linked_but_lapsed_policy_is_not_found() {
        let h = Harness::new();
        let err = h
            .item("CONS-INS-INACTIVE", "POL-MTR-003", h.policies.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound(_)));

        // and the list for that consent simply has nothing to show
        let (page, _, _) = fresh(
            h.list("CONS-INS-INACTIVE", first_page(), None, now())
                .await
                .unwrap(),
        );
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn linked_id_missing_from_the_store_is_not_found_and_uncached() {
        let h = Harness::new();
        h.consents.insert(Consent {
            consent_id: "CONS-INS-GAP".into(),
            participant_id: fixtures::PARTICIPANT.into(),
            psu_id: fixtures::PSU.into(),
            scopes: ["ReadPolicies".to_string()].into(),
            authorized_resource_ids: ["POL-MTR-009".to_string()].into(),
            expires_at: "2099-12-31T23:59:59Z".parse().unwrap(),
        });

        let err = h
            .item("CONS-INS-GAP", "POL-MTR-009", h.policies.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound(_)));
        assert_eq!(h.policies.calls(), 1);
        assert!(h.read_cache.is_empty());
    }

    #[tokio::test]
    async fn token_for_another_participant_is_denied_before_consent_lookup() {
        let h = Harness::new();
        let other = Harness::mint(&h.issuer_key, &h.client_key, Some("TPP-002"));
        let htu = format!("{BASE}/insurance-policies");

        // token for TPP-002, headers claim TPP-001
        let proof = h.proof_for(&other, &htu, now());
        let req = request(&other, &proof, &htu, "CONS-INS-001", None);
        let err = h
            .pipeline
            .read_page(&req, first_page(), h.policies.as_ref(), now())
            .await
            .unwrap_err();
        assert_eq!(forbidden_message(err), "participant mismatch");

        // token and headers agree on TPP-002, but the consent is TPP-001's
        let proof = h.proof_for(&other, &htu, now());
        let req = AccessRequest {
            participant_id: "TPP-002",
            ..request(&other, &proof, &htu, "CONS-INS-001", None)
        };
        let err = h
            .pipeline
            .read_page(&req, first_page(), h.policies.as_ref(), now())
            .await
            .unwrap_err();
        assert_eq!(forbidden_message(err), "participant mismatch");

        assert_eq!(h.policies.calls(), 0);
        assert!(h.read_cache.is_empty());
    }

    #[tokio::test]
    async fn accounts_of_another_psu_are_not_linked() {
        let h = Harness::new();
        let htu = format!("{BASE}/accounts");
        let proof = h.proof(&htu, now());
        let req = request(&h.token, &proof, &htu, "CONS-AIS-001", None);
        let (page, _, _) = fresh(
            h.pipeline
                .read_page(&req, first_page(), h.accounts.as_ref(), now())
                .await
                .unwrap(),
        );
        let ids: Vec<_> = page.items.iter().map(|a| a.account_id.as_str()).collect();
        assert_eq!(ids, ["ACC-001", "ACC-002"]);

        let htu = format!("{BASE}/accounts/ACC-004");
        let proof = h.proof(&htu, now());
        let req = request(&h.token, &proof, &htu, "CONS-AIS-001", None);
        let err = h
            .pipeline
            .read_item(&req, "ACC-004", h.accounts.as_ref(), now())
            .await
            .unwrap_err();
        assert_eq!(forbidden_message(err), "not linked to consent");
    }

    #[tokio::test]
    async fn balances_are_gated_by_the_parent_account() {
        let h = Harness::new();
        let (balances, hit, _) = fresh(h.balances("CONS-AIS-001", "ACC-001").await.unwrap());
        assert!(!hit);
        let kinds: Vec<_> = balances.iter().map(|b| b.balance_type.as_str()).collect();
        assert_eq!(kinds, ["InterimAvailable", "InterimBooked"]);

        let (_, hit, _) = fresh(h.balances("CONS-AIS-001", "ACC-001").await.unwrap());
        assert!(hit);
        assert_eq!(h.balances.calls(), 1);

        let err = h.balances("CONS-AIS-001", "ACC-004").await.unwrap_err();
        assert_eq!(forbidden_message(err), "not linked to consent");
        let err = h.balances("CONS-AIS-001", "ACC-003").await.unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound(_)));
        let err = h.balances("CONS-AIS-001", "ACC-999").await.unwrap_err();
        assert_eq!(forbidden_message(err), "not linked to consent");
        let err = h.balances("CONS-INS-001", "ACC-001").await.unwrap_err();
        assert_eq!(forbidden_message(err), "required scope missing");

        // nothing is read for a foreign or closed account
        assert_eq!(h.balances.calls(), 1);
    }

    #[tokio::test]
    async fn transactions_are_windowed_newest_first() {
        let h = Harness::new();
        let all = BookingWindow::default();
        let (page, _, all_tag) = fresh(
            h.transactions("CONS-AIS-001", "ACC-001", all, first_page())
                .await
                .unwrap(),
        );
        let ids: Vec<_> = page.items.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, ["TXN-1", "TXN-2", "TXN-3"]);

        let january = BookingWindow {
            from: Some("2026-01-01T00:00:00Z".parse().unwrap()),
            to: Some("2026-01-10T00:00:00Z".parse().unwrap()),
        };
        let second = PageRequest {
            page: 2,
            page_size: 1,
        };
        let (page, hit, tag) = fresh(
            h.transactions("CONS-AIS-001", "ACC-001", january, second)
                .await
                .unwrap(),
        );
        assert!(hit);
        assert_ne!(tag, all_tag);
        assert_eq!(page.total_records, 2);
        assert_eq!(page.items[0].transaction_id, "TXN-2");
        assert_eq!(h.transactions.calls(), 1);

        let inverted = BookingWindow {
            from: january.to,
            to: january.from,
        };
        let err = h
            .transactions("CONS-AIS-001", "ACC-001", inverted, first_page())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = h
            .transactions("CONS-AIS-BAL", "ACC-001", all, first_page())
            .await
            .unwrap_err();
        assert_eq!(forbidden_message(err), "required scope missing");
    }

    #[tokio::test]
    async fn item_is_cached_and_conditional() {
        let h = Harness::new();
        let (policy, hit, _) = fresh(
            h.item("CONS-INS-001", "POL-MTR-002", h.policies.as_ref())
                .await
                .unwrap(),
        );
        assert_eq!(policy.policy_id, "POL-MTR-002");
        assert!(!hit);

        let (_, hit, _) = fresh(
            h.item("CONS-INS-001", "POL-MTR-002", h.policies.as_ref())
                .await
                .unwrap(),
        );
        assert!(hit);
        assert_eq!(h.policies.calls(), 1);
    }

    #[tokio::test]
    async fn matching_tag_is_not_modified_but_still_authorized() {
        let h = Harness::new();
        let (_, _, tag) = fresh(h.list("CONS-INS-001", first_page(), None, now()).await.unwrap());

        let outcome = h
            .list("CONS-INS-001", first_page(), Some(&tag), now())
            .await
            .unwrap();
        assert!(matches!(outcome, ServeOutcome::NotModified { .. }));
        assert_eq!(outcome.entity_tag(), tag);
        assert!(outcome.cache_hit());

        let weak = format!("\"other\", W/{tag}");
        let outcome = h
            .list("CONS-INS-001", first_page(), Some(&weak), now())
            .await
            .unwrap();
        assert!(matches!(outcome, ServeOutcome::NotModified { .. }));

        // a known tag never skips the consent decision
        let err = h
            .list("CONS-INS-EXPIRED", first_page(), Some("*"), now())
            .await
            .unwrap_err();
        assert_eq!(forbidden_message(err), "expired");
    }

    #[tokio::test]
    async fn replayed_proof_is_forbidden() {
        let h = Harness::new();
        let htu = format!("{BASE}/insurance-policies");
        let proof = h.proof(&htu, now());
        let req = request(&h.token, &proof, &htu, "CONS-INS-001", None);

        h.pipeline
            .read_page(&req, first_page(), h.policies.as_ref(), now())
            .await
            .unwrap();
        let err = h
            .pipeline
            .read_page(&req, first_page(), h.policies.as_ref(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    struct SlowPort;

    #[async_trait]
    impl ResourceReadPort<InsurancePolicy> for SlowPort {
        async fn find_resource_by_id(
            &self,
            _id: &str,
        ) -> Result<Option<InsurancePolicy>, PortError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn find_resources_by_ids(
            &self,
            _ids: &[String],
        ) -> Result<Vec<InsurancePolicy>, PortError> {
            Err(PortError::Backend("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn read_port_failures_are_unavailable_and_not_cached() {
        let h = Harness::with_settings(PipelineSettings {
            read_timeout: Duration::from_millis(20),
            ..PipelineSettings::default()
        });

        let err = h.item("CONS-INS-001", "POL-MTR-001", &SlowPort).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));

        let htu = format!("{BASE}/insurance-policies");
        let proof = h.proof(&htu, now());
        let req = request(&h.token, &proof, &htu, "CONS-INS-001", None);
        let err = h
            .pipeline
            .read_page(&req, first_page(), &SlowPort, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(h.read_cache.is_empty());
    }

    #[test]
    fn page_parameters_are_validated() {
        let h = Harness::new();
        let p = &h.pipeline;
        assert_eq!(
            p.page_request(None, None).unwrap(),
            PageRequest {
                page: 1,
                page_size: 100
            }
        );
        assert!(matches!(
            p.page_request(Some(0), None),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            p.page_request(Some(1), Some(0)),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            p.page_request(Some(1), Some(101)),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
