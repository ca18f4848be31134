/*
 * Responsibility
 * - 環境変数や設定の読み込み (Auth / DPoP / cache / backing store の設定)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub access_token_leeway_seconds: u64,
    pub access_jwt_public_key_pem: String,

    // Absolute base (https://api.example.com) used to rebuild the expected `htu`.
    pub public_base_url: Option<String>,

    pub dpop_iat_leeway_seconds: i64,
    pub dpop_max_age_seconds: i64,
    pub dpop_allowed_algs: Vec<Algorithm>,

    // None => in-memory fixture stores
    pub database_url: Option<String>,
    // None => in-memory cache
    pub valkey_url: Option<String>,

    pub cache_ttl_seconds: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,

    pub consent_lookup_timeout: Duration,
    pub read_port_timeout: Duration,
    pub cache_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_or("PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let cors_allowed_origins = split_list(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let auth_issuer =
            std::env::var("AUTH_ISSUER").map_err(|_| ConfigError::Missing("AUTH_ISSUER"))?;
        let auth_audience =
            std::env::var("AUTH_AUDIENCE").map_err(|_| ConfigError::Missing("AUTH_AUDIENCE"))?;
        let access_token_leeway_seconds = parse_or("ACCESS_TOKEN_LEEWAY_SECONDS", 60)?;
        let access_jwt_public_key_pem = std::env::var("ACCESS_JWT_PUBLIC_KEY_PEM")
            .map_err(|_| ConfigError::Missing("ACCESS_JWT_PUBLIC_KEY_PEM"))?
            .replace("\\n", "\n");

        let public_base_url = optional("PUBLIC_BASE_URL");
        if let Some(base) = &public_base_url {
            url::Url::parse(base).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;
        }

        let dpop_iat_leeway_seconds = non_negative(
            "DPOP_IAT_LEEWAY_SECONDS",
            parse_or("DPOP_IAT_LEEWAY_SECONDS", 60)?,
        )?;
        let dpop_max_age_seconds =
            non_negative("DPOP_MAX_AGE_SECONDS", parse_or("DPOP_MAX_AGE_SECONDS", 300)?)?;
        let dpop_allowed_algs = parse_algorithms(
            &std::env::var("DPOP_ALLOWED_ALGS").unwrap_or_else(|_| "EdDSA,ES256,PS256".into()),
        )?;

        let database_url = optional("DATABASE_URL");
        let valkey_url = optional("VALKEY_URL");

        let cache_ttl_seconds = parse_or("CACHE_TTL_SECONDS", 30)?;
        let default_page_size: u32 = parse_or("DEFAULT_PAGE_SIZE", 100)?;
        let max_page_size: u32 = parse_or("MAX_PAGE_SIZE", 100)?;
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(ConfigError::Invalid("DEFAULT_PAGE_SIZE"));
        }

        let consent_lookup_timeout =
            Duration::from_millis(parse_or("CONSENT_LOOKUP_TIMEOUT_MS", 2000)?);
        let read_port_timeout = Duration::from_millis(parse_or("READ_PORT_TIMEOUT_MS", 3000)?);
        let cache_timeout = Duration::from_millis(parse_or("CACHE_TIMEOUT_MS", 250)?);

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            auth_issuer,
            auth_audience,
            access_token_leeway_seconds,
            access_jwt_public_key_pem,
            public_base_url,
            dpop_iat_leeway_seconds,
            dpop_max_age_seconds,
            dpop_allowed_algs,
            database_url,
            valkey_url,
            cache_ttl_seconds,
            default_page_size,
            max_page_size,
            consent_lookup_timeout,
            read_port_timeout,
            cache_timeout,
        })
    }

    /// Replay entries must outlive the whole acceptance window (past and future skew).
    pub fn replay_ttl_seconds(&self) -> u64 {
        self.dpop_iat_leeway_seconds
            .saturating_mul(2)
            .saturating_add(self.dpop_max_age_seconds)
            .max(1) as u64
    }
}

fn optional(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Unset => default, set but unparsable => startup failure.
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

// A negative window would reject every proof.
fn non_negative(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Invalid(key));
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let algs = split_list(raw)
        .iter()
        .map(|s| Algorithm::from_str(s).map_err(|_| ConfigError::Invalid("DPOP_ALLOWED_ALGS")))
        .collect::<Result<Vec<_>, _>>()?;

    // A proof-of-possession key must be asymmetric.
    if algs.is_empty()
        || algs
            .iter()
            .any(|a| matches!(a, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
    {
        return Err(ConfigError::Invalid("DPOP_ALLOWED_ALGS"));
    }

    Ok(algs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_accepts_prod_aliases() {
        assert!(AppEnv::parse("PROD").is_production());
        assert!(AppEnv::parse("production").is_production());
        assert!(!AppEnv::parse("staging").is_production());
    }

    #[test]
    fn allowed_algs_reject_symmetric_and_unknown() {
        assert_eq!(
            parse_algorithms("EdDSA, ES256").unwrap(),
            vec![Algorithm::EdDSA, Algorithm::ES256]
        );
        assert!(parse_algorithms("EdDSA,HS256").is_err());
        assert!(parse_algorithms("none").is_err());
        assert!(parse_algorithms(" , ").is_err());
    }

    #[test]
    fn negative_proof_windows_are_invalid() {
        assert_eq!(non_negative("DPOP_MAX_AGE_SECONDS", 0), Ok(0));
        assert_eq!(non_negative("DPOP_MAX_AGE_SECONDS", 300), Ok(300));
        assert_eq!(
            non_negative("DPOP_IAT_LEEWAY_SECONDS", -1),
            Err(ConfigError::Invalid("DPOP_IAT_LEEWAY_SECONDS"))
        );
        assert_eq!(
            ConfigError::Invalid("DPOP_MAX_AGE_SECONDS").to_string(),
            "invalid configuration: DPOP_MAX_AGE_SECONDS"
        );
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" https://a.example , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
