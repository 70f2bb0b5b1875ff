//! The sync engine: mirrors a Stripe account's object graph into Postgres,
//! eventually consistent, via paginated backfill and live webhooks.
//!
//! One [`SyncEngine`] serves one credential (one provider account). Several
//! engines — and several processes — may share a database; all coordination
//! happens through it (advisory locks, run rows, cursor rows). Rows are
//! partitioned by `account_id` throughout and engines never see each other's
//! data.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use ssync_config::{PoolSettings, SyncConfig};
use ssync_db::{run_migrations, Db};
use ssync_stripe::{HttpStripeClient, StripeClient, ALL_KINDS};
use tokio::sync::OnceCell;
use tracing::warn;

mod accounts;
mod admin;
mod backfill;
mod error;
mod managed;
mod objects;
mod pipeline;
mod project;
pub mod runs;

pub use admin::{DeleteAccountOptions, DeleteReport};
pub use backfill::{BackfillOptions, BackfillReport, CreatedFilter, KindSummary, PageOutcome};
pub use error::SyncError;
pub use managed::{ManagedWebhook, ManagedWebhookOptions, MANAGED_BY, MANAGED_DESCRIPTION};
pub use objects::table_name;
pub use runs::{dashboard, DashboardRow};
pub use ssync_stripe::ObjectKind;

pub struct SyncEngine {
    cfg: SyncConfig,
    db: Db,
    client: Arc<dyn StripeClient>,
    /// Resolved once per engine lifetime from `GET /v1/account`.
    account_id: OnceCell<String>,
}

impl SyncEngine {
    /// Connect a pool, build the HTTP client, and apply migrations.
    pub async fn connect(cfg: SyncConfig, pool: &PoolSettings) -> Result<Self, SyncError> {
        cfg.validate()?;
        let db = Db::connect(pool, &cfg.schema).await?;
        let client = Arc::new(HttpStripeClient::new(&cfg)?);
        let engine = Self::with_parts(cfg, db, client);
        engine.migrate().await?;
        Ok(engine)
    }

    /// Assemble from preconstructed parts (tests inject a mock client and an
    /// existing pool here). Does not migrate.
    pub fn with_parts(cfg: SyncConfig, db: Db, client: Arc<dyn StripeClient>) -> Self {
        Self {
            cfg,
            db,
            client,
            account_id: OnceCell::new(),
        }
    }

    /// Apply any pending schema migrations.
    pub async fn migrate(&self) -> Result<(), SyncError> {
        run_migrations(&self.db).await.map_err(SyncError::from)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn client(&self) -> &dyn StripeClient {
        self.client.as_ref()
    }

    /// Every kind this engine can mirror, in backfill order.
    pub fn get_supported_sync_objects() -> Vec<&'static str> {
        ALL_KINDS.iter().map(|k| k.as_str()).collect()
    }

    /// The acting account id. First call retrieves the account from the
    /// provider and upserts its row; later calls are served from cache.
    pub async fn account_id(&self) -> Result<String, SyncError> {
        let id = self
            .account_id
            .get_or_try_init(|| async {
                let raw = self.client.retrieve_account().await?;
                accounts::upsert_account_full(&self.db, &raw).await
            })
            .await?;
        Ok(id.clone())
    }

    /// Recent run status for the current account (the `sync_dashboard` view).
    pub async fn sync_status(&self, limit: i64) -> Result<Vec<DashboardRow>, SyncError> {
        let account = self.account_id().await?;
        runs::dashboard(&self.db, &account, limit).await
    }

    /// Graceful teardown: optionally remove managed webhooks, then drain the
    /// pool. Best-effort on the provider side — a dead endpoint registration
    /// is reconciled away on the next startup anyway.
    pub async fn shutdown(&self) {
        if !self.cfg.keep_managed_webhooks_on_shutdown {
            match self.list_managed_webhooks().await {
                Ok(webhooks) => {
                    for webhook in webhooks {
                        if let Err(e) = self.delete_managed_webhook(&webhook.id).await {
                            warn!(id = %webhook.id, error = %e, "failed to delete managed webhook");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "could not list managed webhooks for teardown"),
            }
        }
        self.db.close().await;
    }
}

/// Stable 64-bit advisory-lock key from the leading bytes of a SHA-256
/// digest. The schema is part of the key so deployments sharing one Postgres
/// instance never contend on each other's locks.
pub(crate) fn advisory_key(scope: &str, schema: &str, a: &str, b: &str) -> i64 {
    let mut hasher = Sha256::new();
    for part in [scope, schema, a, b] {
        hasher.update(part.as_bytes());
        hasher.update(b":");
    }
    let digest = hasher.finalize();
    i64::from_be_bytes(digest[..8].try_into().expect("sha256 yields 32 bytes"))
}
