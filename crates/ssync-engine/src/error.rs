use std::fmt;

use ssync_config::ConfigError;
use ssync_db::DbError;
use ssync_stripe::{ObjectKind, StripeError};

/// Engine-level error taxonomy.
///
/// Retryable provider faults never reach this type — the client retries them
/// internally and surfaces exhaustion as `Stripe(Transport)`. Everything here
/// is either fatal or a caller decision.
#[derive(Debug)]
pub enum SyncError {
    /// Bad configuration; fatal at init.
    Config(ConfigError),
    /// Database failure (including migrations).
    Db(DbError),
    /// Provider failure after retries, or a non-retryable rejection.
    Stripe(StripeError),
    /// Webhook signature verification failed; callers answer 400 and must
    /// not project anything.
    Signature(String),
    /// A projector met a payload it cannot interpret.
    Projection {
        kind: ObjectKind,
        object_id: Option<String>,
        message: String,
    },
    /// A second backfill was started while one is open for the account.
    ConcurrentRun { account_id: String },
    /// An object-kind name the engine does not support.
    UnknownKind(String),
}

impl SyncError {
    pub fn projection(
        kind: ObjectKind,
        object_id: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Projection {
            kind,
            object_id: object_id.map(str::to_string),
            message: message.into(),
        }
    }

    /// True when the caller should answer HTTP 400 (bad webhook signature).
    pub fn is_signature(&self) -> bool {
        matches!(self, SyncError::Signature(_))
    }

    pub fn is_concurrent_run(&self) -> bool {
        matches!(self, SyncError::ConcurrentRun { .. })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Config(e) => write!(f, "config error: {e}"),
            SyncError::Db(e) => write!(f, "database error: {e}"),
            SyncError::Stripe(e) => write!(f, "provider error: {e}"),
            SyncError::Signature(msg) => write!(f, "webhook signature rejected: {msg}"),
            SyncError::Projection {
                kind,
                object_id: Some(id),
                message,
            } => write!(f, "projection failed for {kind} {id}: {message}"),
            SyncError::Projection {
                kind,
                object_id: None,
                message,
            } => write!(f, "projection failed for {kind}: {message}"),
            SyncError::ConcurrentRun { account_id } => {
                write!(f, "a sync run is already open for account {account_id}")
            }
            SyncError::UnknownKind(name) => write!(f, "unsupported object kind: {name}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Config(e) => Some(e),
            SyncError::Db(e) => Some(e),
            SyncError::Stripe(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        SyncError::Config(e)
    }
}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        SyncError::Db(e)
    }
}

impl From<StripeError> for SyncError {
    fn from(e: StripeError) -> Self {
        match e {
            StripeError::Signature(msg) => SyncError::Signature(msg),
            other => SyncError::Stripe(other),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Db(DbError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_errors_map_to_the_400_path() {
        let e: SyncError = StripeError::Signature("no v1 matched".into()).into();
        assert!(e.is_signature());

        let e: SyncError = StripeError::NotFound.into();
        assert!(!e.is_signature());
    }

    #[test]
    fn display_names_the_object() {
        let e = SyncError::projection(ObjectKind::Invoice, Some("in_1"), "missing id");
        assert_eq!(e.to_string(), "projection failed for invoice in_1: missing id");
    }
}
