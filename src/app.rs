/*
 * Responsibility
 * - Config読み込み → 依存生成 (stores / cache / verifiers / pipeline) → Router 組み立て
 * - Middleware の適用 (HTTP / security headers / CORS)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use chrono::TimeDelta;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::Config;
use crate::middleware;
use crate::repos::{
    account_repo::PgAccountReadPort,
    balance_repo::PgBalanceReadPort,
    consent_repo::PgConsentStore,
    memory::{InMemoryAccountDataStore, InMemoryConsentStore, InMemoryResourceStore, fixtures},
    policy_repo::PgPolicyReadPort,
    transaction_repo::PgTransactionReadPort,
};
use crate::services::auth::{build_auth_service, build_dpop_verifier, replay::CacheReplayStore};
use crate::services::cache::{CacheClient, InMemoryCacheClient, ReadThroughCache, ValkeyClient};
use crate::services::clock::SystemClock;
use crate::services::consent::{ConsentGuard, ConsentStore};
use crate::services::open_finance::{AccessPipeline, PipelineSettings};
use crate::state::{AppState, ReadPorts};

pub const API_PREFIX: &str = "/open-finance/v1";

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,open_finance_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost".
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting Open Finance API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_ports(config: &Config) -> Result<(Arc<dyn ConsentStore>, ReadPorts)> {
    match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.read_port_timeout)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!("using postgres consent store and read ports");

            let ports = ReadPorts {
                policies: Arc::new(PgPolicyReadPort::new(db.clone())),
                accounts: Arc::new(PgAccountReadPort::new(db.clone())),
                balances: Arc::new(PgBalanceReadPort::new(db.clone())),
                transactions: Arc::new(PgTransactionReadPort::new(db.clone())),
            };
            Ok((Arc::new(PgConsentStore::new(db)), ports))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; serving in-memory fixture data");
            let ports = ReadPorts {
                policies: Arc::new(InMemoryResourceStore::with_records(fixtures::policies())),
                accounts: Arc::new(InMemoryResourceStore::with_records(fixtures::accounts())),
                balances: Arc::new(InMemoryAccountDataStore::with_records(fixtures::balances())),
                transactions: Arc::new(InMemoryAccountDataStore::with_records(
                    fixtures::transactions(),
                )),
            };
            Ok((
                Arc::new(InMemoryConsentStore::with_consents(fixtures::consents())),
                ports,
            ))
        }
    }
}

async fn build_cache_client(config: &Config) -> Result<Arc<dyn CacheClient>> {
    match &config.valkey_url {
        Some(url) => {
            let client = ValkeyClient::new(url)
                .await
                .context("failed to connect to valkey")?;
            Ok(Arc::new(client))
        }
        None => {
            // Replay protection is then per-process only.
            tracing::warn!("VALKEY_URL not set; using in-memory cache and replay store");
            Ok(Arc::new(InMemoryCacheClient::new()))
        }
    }
}

async fn build_state(config: &Config) -> Result<AppState> {
    let (consents, ports) = build_ports(config).await?;
    let cache_client = build_cache_client(config).await?;

    let auth = build_auth_service(config).context("invalid access token verification key")?;
    let replay = CacheReplayStore::new(cache_client.clone(), "dpop:replay");
    let dpop = build_dpop_verifier(config, Arc::new(replay));
    let guard = ConsentGuard::new(consents, config.consent_lookup_timeout);
    let cache = ReadThroughCache::new(cache_client, "of", config.cache_timeout);

    let settings = PipelineSettings {
        cache_ttl: TimeDelta::seconds(config.cache_ttl_seconds as i64),
        default_page_size: config.default_page_size,
        max_page_size: config.max_page_size,
        read_timeout: config.read_port_timeout,
    };
    let pipeline = AccessPipeline::new(auth, dpop, guard, cache, settings);

    Ok(AppState::new(
        pipeline,
        ports,
        Arc::new(SystemClock),
        config.public_base_url.clone(),
    ))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, api::v1::routes())
        .with_state(state);

    let router = middleware::http::apply(router);
    let router = middleware::security_headers::apply(router);
    middleware::cors::apply(router, config)
}
