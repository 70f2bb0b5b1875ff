//! Live webhook pipeline: verify, resolve the acting account, dispatch to a
//! projector, acknowledge.
//!
//! Idempotency comes from the projectors — Stripe redelivers freely and the
//! upserts make replay a no-op. Transient projection failures propagate to
//! the caller so the provider's redelivery is the retry mechanism.

use serde_json::Value;
use ssync_stripe::{is_tombstone_event, kind_for_event_type, webhook};
use tracing::{info, warn};

use crate::accounts::upsert_account_stub;
use crate::error::SyncError;
use crate::project::{project, tombstone, ProjectCtx};
use crate::SyncEngine;

impl SyncEngine {
    /// Verify and apply one webhook delivery.
    ///
    /// Fails with a signature error (caller answers 400) before anything is
    /// written; unsupported event types are acknowledged without projection.
    pub async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<(), SyncError> {
        let event = webhook::construct_event(
            raw_body,
            signature_header,
            self.config().stripe_webhook_secret.expose(),
        )?;

        // Connect platforms receive events on behalf of other accounts; the
        // envelope names the owner. Direct instances fall back to their own.
        let account = match &event.account {
            Some(account) => {
                upsert_account_stub(self.db(), account).await?;
                account.clone()
            }
            None => self.account_id().await?,
        };

        let Some(kind) = kind_for_event_type(&event.event_type) else {
            warn!(event = %event.id, event_type = %event.event_type, "ignoring unsupported event type");
            return Ok(());
        };

        let object = &event.data.object;
        if is_tombstone_event(&event.event_type) {
            let id = object
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SyncError::projection(kind, None, "tombstone event without object id")
                })?;
            tombstone(self.db(), kind, &account, id).await?;
        } else {
            let ctx = ProjectCtx {
                db: self.db(),
                client: self.client(),
                account_id: &account,
                auto_expand: self.config().auto_expand_lists,
            };
            project(&ctx, kind, object).await?;
        }

        info!(event = %event.id, event_type = %event.event_type, account = %account, "webhook applied");
        Ok(())
    }
}
