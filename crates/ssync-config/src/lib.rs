//! Runtime configuration for the sync engine.
//!
//! This crate is the single source of truth for configuration resolution.
//!
//! # Contract
//! - Callers invoke [`SyncConfig::from_env`] (or build one explicitly) once at
//!   startup and pass the result into constructors; never scatter
//!   `std::env::var` calls across the codebase.
//! - `Debug` impls on secret-containing types **redact** values.
//! - Error messages reference the env var **name**, never the value.

use std::fmt;
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "SSYNC_DATABASE_URL";
pub const ENV_SECRET_KEY: &str = "STRIPE_SECRET_KEY";
pub const ENV_WEBHOOK_SECRET: &str = "STRIPE_WEBHOOK_SECRET";
pub const ENV_API_VERSION: &str = "STRIPE_API_VERSION";
pub const ENV_SCHEMA: &str = "SSYNC_SCHEMA";

/// Default database namespace for every table the engine owns.
pub const DEFAULT_SCHEMA: &str = "stripe";

/// Configuration failures. Fatal at init; nothing retries these.
#[derive(Debug)]
pub enum ConfigError {
    /// A required env var is absent or empty. Carries the var name only.
    MissingEnv(&'static str),
    /// A value was present but unusable (bad number, bad duration, ...).
    Invalid { name: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnv(name) => write!(f, "missing required env var {name}"),
            ConfigError::Invalid { name, reason } => {
                write!(f, "invalid value for {name}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A secret that must never appear in logs or error output.
///
/// `Debug` prints `<REDACTED>`; the raw value is only reachable through
/// [`SecretString::expose`].
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// Connection-pool settings handed to the database adapter.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub connection_string: SecretString,
    pub max_connections: u32,
    pub tcp_keepalive: bool,
}

impl PoolSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: SecretString::new(connection_string),
            max_connections: 10,
            tcp_keepalive: true,
        }
    }
}

/// Everything the engine needs to run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Stripe API credential (`sk_...` / `rk_...`).
    pub stripe_secret_key: SecretString,
    /// Endpoint signing secret (`whsec_...`) used to verify webhook payloads.
    pub stripe_webhook_secret: SecretString,
    /// Pinned API version sent as `Stripe-Version`; `None` uses the account default.
    pub stripe_api_version: Option<String>,
    /// API origin. Overridable so tests can point at a local mock.
    pub stripe_api_base: String,
    /// Database namespace. Empty string means "no schema prefix".
    pub schema: String,
    /// Expand single-hop sub-objects (invoice lines, subscription items) during projection.
    pub auto_expand_lists: bool,
    /// During backfill, enqueue referenced kinds that have never been synced.
    pub backfill_related_entities: bool,
    /// Max object-kinds advanced concurrently by one `process_until_done`.
    pub max_concurrent: usize,
    /// Page size for list calls. Stripe caps this at 100.
    pub page_limit: u32,
    /// Deadline for every provider HTTP call.
    pub request_timeout: Duration,
    /// How long in-flight work may drain on SIGINT/SIGTERM.
    pub shutdown_grace: Duration,
    /// Leave provider-side managed webhooks in place on shutdown.
    pub keep_managed_webhooks_on_shutdown: bool,
}

impl SyncConfig {
    /// Build a config with defaults from the two required secrets.
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            stripe_secret_key: SecretString::new(secret_key),
            stripe_webhook_secret: SecretString::new(webhook_secret),
            stripe_api_version: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            auto_expand_lists: false,
            backfill_related_entities: true,
            max_concurrent: 4,
            page_limit: 100,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            keep_managed_webhooks_on_shutdown: false,
        }
    }

    /// Resolve config + pool settings from the environment.
    ///
    /// Loads `.env.local` first if present (dev convenience; silent when the
    /// file does not exist — production injects env vars directly).
    pub fn from_env() -> Result<(Self, PoolSettings), ConfigError> {
        let _ = dotenvy::from_filename(".env.local");

        let secret_key = require_env(ENV_SECRET_KEY)?;
        let webhook_secret = require_env(ENV_WEBHOOK_SECRET)?;
        let database_url = require_env(ENV_DATABASE_URL)?;

        let mut cfg = Self::new(secret_key, webhook_secret);
        cfg.stripe_api_version = optional_env(ENV_API_VERSION);
        if let Some(schema) = optional_env(ENV_SCHEMA) {
            cfg.schema = schema;
        }
        cfg.validate()?;

        Ok((cfg, PoolSettings::new(database_url)))
    }

    /// Reject configs no constructor path should produce but a caller might.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stripe_secret_key.is_empty() {
            return Err(ConfigError::MissingEnv(ENV_SECRET_KEY));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ConfigError::MissingEnv(ENV_WEBHOOK_SECRET));
        }
        if self.page_limit == 0 || self.page_limit > 100 {
            return Err(ConfigError::Invalid {
                name: "page_limit",
                reason: format!("must be 1..=100, got {}", self.page_limit),
            });
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                name: "max_concurrent",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

fn optional_env(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let s = SecretString::new("sk_test_abc123");
        assert_eq!(format!("{s:?}"), "<REDACTED>");
        assert_eq!(s.expose(), "sk_test_abc123");
    }

    #[test]
    fn config_debug_never_leaks_secrets() {
        let cfg = SyncConfig::new("sk_test_abc123", "whsec_xyz");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk_test_abc123"));
        assert!(!dbg.contains("whsec_xyz"));
    }

    #[test]
    fn defaults_match_contract() {
        let cfg = SyncConfig::new("sk", "whsec");
        assert_eq!(cfg.schema, "stripe");
        assert_eq!(cfg.page_limit, 100);
        assert_eq!(cfg.max_concurrent, 4);
        assert!(cfg.backfill_related_entities);
        assert!(!cfg.auto_expand_lists);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_page_limit_rejected() {
        let mut cfg = SyncConfig::new("sk", "whsec");
        cfg.page_limit = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_secret_rejected() {
        let cfg = SyncConfig::new("", "whsec");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains(ENV_SECRET_KEY));
    }
}
