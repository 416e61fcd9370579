//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Toss Payments test-mode secret published in the gateway's documentation.
/// Only used outside production when no secret is configured.
pub const TOSS_TEST_SECRET_KEY: &str = "test_gsk_docs_OaPz8L5KdmQXkzRz3y47BMw6";

/// Toss Payments confirm endpoint.
pub const TOSS_CONFIRM_URL: &str = "https://api.tosspayments.com/v1/payments/confirm";

const DEV_SESSION_SECRET: &str = "aptest-dev-session-secret";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A secret required in production is missing.
    #[error("{0} must be set in production")]
    MissingSecret(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Upper bound for `ACCOUNT_VALIDITY_DAYS`.
pub const MAX_ACCOUNT_VALIDITY_DAYS: i64 = 36_500;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Maximum pooled database connections (default: 10).
    pub db_max_connections: u32,

    /// Deployment environment (`APP_ENV`, default: "development").
    pub environment: String,

    /// HS256 secret the identity provider signs session tokens with.
    pub session_secret: String,

    /// Toss Payments secret key (basic-auth user name).
    pub toss_secret_key: String,

    /// Toss Payments confirm endpoint.
    pub toss_confirm_url: String,

    /// Gateway call timeout in seconds (default: 15).
    pub gateway_timeout_seconds: u64,

    /// Resolve sessions by display name when nothing else identifies them.
    pub allow_name_fallback: bool,

    /// How long a new personal account may take tests, in days (default: 365).
    pub account_validity_days: i64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Toss secrets file structure.
#[derive(Debug, Deserialize)]
struct TossSecrets {
    secret_key: String,
    #[serde(default)]
    confirm_url: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns an error when a value does not parse, or when production is
    /// missing the session or gateway secret.
    pub fn from_env() -> Result<Self, ConfigError> {
        let toss_file = load_toss_secrets();
        Self::from_lookup(|key| std::env::var(key).ok(), toss_file)
    }

    fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        toss_file: Option<TossSecrets>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let environment = var("APP_ENV").unwrap_or(defaults.environment);
        let production = environment == "production";

        let session_secret = match var("SESSION_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::MissingSecret("SESSION_SECRET")),
            None => defaults.session_secret,
        };

        let (file_key, file_url) = toss_file.map_or((None, None), |s| (Some(s.secret_key), s.confirm_url));
        let toss_secret_key = match var("TOSS_SECRET_KEY").or(file_key) {
            Some(key) => key,
            None if production => return Err(ConfigError::MissingSecret("TOSS_SECRET_KEY")),
            None => defaults.toss_secret_key,
        };

        Ok(Self {
            listen_addr: var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse(&var, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            environment,
            session_secret,
            toss_secret_key,
            toss_confirm_url: var("TOSS_CONFIRM_URL")
                .or(file_url)
                .unwrap_or(defaults.toss_confirm_url),
            gateway_timeout_seconds: parse(
                &var,
                "GATEWAY_TIMEOUT_SECONDS",
                defaults.gateway_timeout_seconds,
            )?,
            allow_name_fallback: parse(&var, "ALLOW_NAME_FALLBACK", defaults.allow_name_fallback)?,
            account_validity_days: parse_validity_days(&var, defaults.account_validity_days)?,
            cors_origins: var("CORS_ORIGINS").map_or(defaults.cors_origins, |origins| {
                origins.split(',').map(|s| s.trim().to_string()).collect()
            }),
            max_body_bytes: parse(&var, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            request_timeout_seconds: parse(
                &var,
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            )?,
        })
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// `ACCOUNT_VALIDITY_DAYS` must fall within 1 day and 100 years.
fn parse_validity_days(
    var: &impl Fn(&str) -> Option<String>,
    default: i64,
) -> Result<i64, ConfigError> {
    const KEY: &str = "ACCOUNT_VALIDITY_DAYS";

    let days = parse(var, KEY, default)?;
    if (1..=MAX_ACCOUNT_VALIDITY_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::Invalid {
            key: KEY,
            value: days.to_string(),
        })
    }
}

/// Load Toss secrets from the first secrets file found.
fn load_toss_secrets() -> Option<TossSecrets> {
    let secret_paths = [
        ".secrets/toss.json",
        "aptest/.secrets/toss.json",
        "../.secrets/toss.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<TossSecrets>(path) {
            tracing::info!(path = %path, "Loaded Toss secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Toss secrets file not found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, std::io::Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "postgres://localhost/aptest".into(),
            db_max_connections: 10,
            environment: "development".into(),
            session_secret: DEV_SESSION_SECRET.into(),
            toss_secret_key: TOSS_TEST_SECRET_KEY.into(),
            toss_confirm_url: TOSS_CONFIRM_URL.into(),
            gateway_timeout_seconds: 15,
            allow_name_fallback: false,
            account_validity_days: 365,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
