//! Managed-webhook lifecycle.
//!
//! The engine owns every provider-side endpoint it creates, recognizable by
//! `metadata.managed_by = "stripe-sync"`. Local `_managed_webhooks` rows and
//! provider endpoints are reconciled on every `find_or_create`, never
//! assumed: orphans on either side are deleted before anything new is made.
//! The whole routine runs under an advisory lock keyed on (account, url), so
//! N concurrent callers converge on one endpoint and one local row.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use ssync_stripe::types::{WebhookEndpoint, WebhookEndpointCreate};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::{advisory_key, SyncEngine};

/// Marker stamped on every endpoint this engine creates.
pub const MANAGED_BY: &str = "stripe-sync";
pub const MANAGED_DESCRIPTION: &str = "Stripe Sync managed webhook";

/// A provider endpoint under this engine's ownership.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedWebhook {
    pub id: String,
    pub account_id: String,
    pub url: String,
    pub enabled_events: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ManagedWebhookOptions {
    /// Defaults to `["*"]`.
    pub enabled_events: Option<Vec<String>>,
}

/// Endpoints created by earlier tooling generations, recognized by
/// description since they predate the metadata marker.
fn is_legacy_description(description: Option<&str>) -> bool {
    let Some(description) = description else {
        return false;
    };
    if description == "stripe-sync-cli development webhook"
        || description == "Stripe Sync Development"
    {
        return true;
    }
    let normalized = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    normalized.starts_with("stripe sync")
}

fn is_ours(endpoint: &WebhookEndpoint) -> bool {
    endpoint.managed_by() == Some(MANAGED_BY)
        || is_legacy_description(endpoint.description.as_deref())
}

impl SyncEngine {
    /// Return the managed endpoint for `base_url`, creating it if needed.
    ///
    /// Race-free: concurrent callers with the same (account, url) serialize
    /// on an advisory lock and all receive the same endpoint.
    pub async fn find_or_create_managed_webhook(
        &self,
        base_url: &str,
        opts: Option<ManagedWebhookOptions>,
    ) -> Result<ManagedWebhook, SyncError> {
        let account = self.account_id().await?;
        let enabled_events = opts
            .and_then(|o| o.enabled_events)
            .unwrap_or_else(|| vec!["*".to_string()]);

        let key = advisory_key("managed-webhook", self.db().schema(), &account, base_url);
        self.db()
            .with_advisory_lock(key, || {
                let account = account.clone();
                let enabled_events = enabled_events.clone();
                async move {
                    self.find_or_create_locked(&account, base_url, enabled_events)
                        .await
                }
            })
            .await
    }

    async fn find_or_create_locked(
        &self,
        account: &str,
        base_url: &str,
        enabled_events: Vec<String>,
    ) -> Result<ManagedWebhook, SyncError> {
        let table = self.db().table("_managed_webhooks");

        // Reconcile local rows for this URL against the provider.
        let rows = sqlx::query(&format!(
            "select id, url, enabled_events, created_at from {table} where account_id = $1 and url = $2"
        ))
        .bind(account)
        .bind(base_url)
        .fetch_all(self.db().pool())
        .await
        .map_err(SyncError::from)?;

        let mut valid: Option<ManagedWebhook> = None;
        for row in rows {
            let local_id: String = row.try_get("id").map_err(ssync_db::DbError::from)?;
            match self.client().retrieve_webhook_endpoint(&local_id).await? {
                None => {
                    warn!(id = %local_id, "managed webhook gone on provider; dropping local row");
                    self.delete_local_webhook(account, &local_id).await?;
                }
                Some(ep) if ep.url != base_url || ep.managed_by() != Some(MANAGED_BY) => {
                    warn!(id = %local_id, url = %ep.url, "legacy or mismatched endpoint; deleting both sides");
                    self.client().delete_webhook_endpoint(&ep.id).await?;
                    self.delete_local_webhook(account, &local_id).await?;
                }
                Some(_) => {
                    valid = Some(managed_from_row(&row, account)?);
                }
            }
        }
        if let Some(webhook) = valid {
            return Ok(webhook);
        }

        // Cross-orphan cleanup: provider endpoints that claim to be ours but
        // have no local row left (a previous process died between calls).
        let local_ids: HashSet<String> = sqlx::query(&format!(
            "select id from {table} where account_id = $1"
        ))
        .bind(account)
        .fetch_all(self.db().pool())
        .await
        .map_err(SyncError::from)?
        .into_iter()
        .filter_map(|r| r.try_get("id").ok())
        .collect();

        let mut cursor: Option<String> = None;
        loop {
            let (endpoints, has_more) = self
                .client()
                .list_webhook_endpoints(cursor.as_deref())
                .await?;
            let last_id = endpoints.last().map(|e| e.id.clone());
            for ep in endpoints {
                if is_ours(&ep) && !local_ids.contains(&ep.id) {
                    warn!(id = %ep.id, url = %ep.url, "deleting orphaned managed endpoint");
                    self.client().delete_webhook_endpoint(&ep.id).await?;
                }
            }
            if !has_more {
                break;
            }
            cursor = last_id;
        }

        // Nothing valid remains; create fresh.
        let created = self
            .client()
            .create_webhook_endpoint(&WebhookEndpointCreate {
                url: base_url.to_string(),
                enabled_events: enabled_events.clone(),
                description: MANAGED_DESCRIPTION.to_string(),
                metadata: vec![("managed_by".to_string(), MANAGED_BY.to_string())],
            })
            .await?;
        info!(id = %created.id, url = %base_url, "created managed webhook");

        let row = sqlx::query(&format!(
            r#"
            insert into {table} (id, account_id, url, enabled_events)
            values ($1, $2, $3, $4)
            on conflict (account_id, url) do update set
                id             = excluded.id,
                enabled_events = excluded.enabled_events
            returning created_at
            "#
        ))
        .bind(&created.id)
        .bind(account)
        .bind(base_url)
        .bind(serde_json::to_value(&enabled_events).expect("string vec serializes"))
        .fetch_one(self.db().pool())
        .await
        .map_err(SyncError::from)?;

        Ok(ManagedWebhook {
            id: created.id,
            account_id: account.to_string(),
            url: base_url.to_string(),
            enabled_events,
            created_at: row.try_get("created_at").map_err(ssync_db::DbError::from)?,
        })
    }

    /// Delete a managed endpoint, provider side first. Tolerates the endpoint
    /// already being gone on either side.
    pub async fn delete_managed_webhook(&self, id: &str) -> Result<(), SyncError> {
        let account = self.account_id().await?;
        let existed = self.client().delete_webhook_endpoint(id).await?;
        if !existed {
            info!(%id, "provider endpoint already gone");
        }
        self.delete_local_webhook(&account, id).await
    }

    /// Managed webhooks for the current account only.
    pub async fn list_managed_webhooks(&self) -> Result<Vec<ManagedWebhook>, SyncError> {
        let account = self.account_id().await?;
        let table = self.db().table("_managed_webhooks");

        let rows = sqlx::query(&format!(
            "select id, url, enabled_events, created_at from {table} where account_id = $1 order by created_at"
        ))
        .bind(&account)
        .fetch_all(self.db().pool())
        .await
        .map_err(SyncError::from)?;

        rows.iter().map(|r| managed_from_row(r, &account)).collect()
    }

    async fn delete_local_webhook(&self, account: &str, id: &str) -> Result<(), SyncError> {
        let table = self.db().table("_managed_webhooks");
        sqlx::query(&format!(
            "delete from {table} where account_id = $1 and id = $2"
        ))
        .bind(account)
        .bind(id)
        .execute(self.db().pool())
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }
}

fn managed_from_row(
    row: &sqlx::postgres::PgRow,
    account: &str,
) -> Result<ManagedWebhook, SyncError> {
    let enabled_events: serde_json::Value = row
        .try_get("enabled_events")
        .map_err(ssync_db::DbError::from)?;
    Ok(ManagedWebhook {
        id: row.try_get("id").map_err(ssync_db::DbError::from)?,
        account_id: account.to_string(),
        url: row.try_get("url").map_err(ssync_db::DbError::from)?,
        enabled_events: serde_json::from_value(enabled_events).unwrap_or_default(),
        created_at: row
            .try_get("created_at")
            .map_err(ssync_db::DbError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_descriptions_are_recognized() {
        assert!(is_legacy_description(Some("stripe-sync-cli development webhook")));
        assert!(is_legacy_description(Some("Stripe Sync Development")));
        assert!(is_legacy_description(Some("Stripe   Sync managed webhook")));
        assert!(is_legacy_description(Some("STRIPE SYNC something")));
        assert!(!is_legacy_description(Some("customer billing hook")));
        assert!(!is_legacy_description(None));
    }

    #[test]
    fn metadata_marker_beats_description() {
        let ep: WebhookEndpoint = serde_json::from_value(serde_json::json!({
            "id": "we_1",
            "url": "https://x.example/hooks",
            "description": "completely unrelated",
            "metadata": {"managed_by": "stripe-sync"}
        }))
        .unwrap();
        assert!(is_ours(&ep));

        let foreign: WebhookEndpoint = serde_json::from_value(serde_json::json!({
            "id": "we_2",
            "url": "https://x.example/hooks",
            "description": "ops endpoint",
            "metadata": {"managed_by": "other-tool"}
        }))
        .unwrap();
        assert!(!is_ours(&foreign));
    }
}
