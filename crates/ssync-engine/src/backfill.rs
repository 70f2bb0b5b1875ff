//! Backfill state machine: paginated ingestion with restartable cursors.
//!
//! One page is the unit of work. A page is fetched with
//! `starting_after = cursor`, every object on it is projected (idempotently,
//! so replay after a crash is safe), and only then does the cursor advance.
//! Advisory locks keyed on (account, kind) guarantee at most one active page
//! per kind across workers and processes.

use std::collections::{BTreeMap, HashSet};

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::Row;
use ssync_stripe::types::ListParams;
use ssync_stripe::{ObjectKind, ALL_KINDS};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::objects::parent_kinds;
use crate::project::{project, ProjectCtx};
use crate::runs::{self, ObjRunStatus};
use crate::{advisory_key, SyncEngine};

/// Result of one `process_next` call.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageOutcome {
    pub has_more: bool,
    pub processed: u64,
}

/// Provider-side `created` range filter for list calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreatedFilter {
    pub gte: Option<i64>,
    pub lte: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// `None` backfills every supported kind in dependency order.
    pub object: Option<ObjectKind>,
    pub created: Option<CreatedFilter>,
    pub triggered_by: String,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            object: None,
            created: None,
            triggered_by: "api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct KindSummary {
    pub synced: u64,
    pub errors: u64,
}

/// Per-kind outcome of a full backfill, keyed by kind name.
pub type BackfillReport = BTreeMap<&'static str, KindSummary>;

impl SyncEngine {
    /// Claim and process the next page of `kind` for the current account.
    ///
    /// When another worker holds the (account, kind) claim this returns
    /// `{has_more: true, processed: 0}` without fetching — the other worker
    /// is making the progress.
    pub async fn process_next(&self, kind: ObjectKind) -> Result<PageOutcome, SyncError> {
        let account = self.account_id().await?;
        let key = advisory_key("backfill", self.db().schema(), &account, kind.as_str());

        let outcome = self
            .db()
            .with_try_advisory_lock(key, || {
                let account = account.clone();
                async move { self.page_once(&account, kind, None).await }
            })
            .await?;

        match outcome {
            Some((processed, has_more)) => Ok(PageOutcome {
                has_more,
                processed,
            }),
            None => {
                debug!(%kind, "page claim held elsewhere; skipping");
                Ok(PageOutcome {
                    has_more: true,
                    processed: 0,
                })
            }
        }
    }

    /// Drive every requested kind to `done`, with run bookkeeping.
    ///
    /// Opens exactly one run (failing with `ConcurrentRun` if one is open),
    /// creates pending sub-run rows, advances kinds concurrently up to
    /// `max_concurrent`, and closes the run whether or not kinds errored.
    pub async fn process_until_done(
        &self,
        opts: &BackfillOptions,
    ) -> Result<BackfillReport, SyncError> {
        let account = self.account_id().await?;
        let kinds = self.kinds_to_backfill(&account, opts.object).await?;

        let run_id = runs::open_run(
            self.db(),
            &account,
            self.config().max_concurrent,
            &opts.triggered_by,
        )
        .await?;
        info!(%run_id, account = %account, kinds = kinds.len(), "sync run opened");

        for kind in &kinds {
            runs::record_object(self.db(), run_id, *kind, ObjRunStatus::Pending, 0, None).await?;
        }

        let account_ref = &account;
        let created = opts.created;
        let results: Vec<(ObjectKind, u64, Option<SyncError>)> =
            stream::iter(kinds.iter().copied())
                .map(|kind| async move {
                    let (processed, err) =
                        self.drive_kind(run_id, account_ref, kind, created).await;
                    (kind, processed, err)
                })
                .buffer_unordered(self.config().max_concurrent)
                .collect()
                .await;

        runs::close_run(self.db(), run_id).await?;

        let mut report = BackfillReport::new();
        for (kind, processed, err) in results {
            let errors = match err {
                None => 0,
                Some(e) => {
                    warn!(%kind, error = %e, "backfill kind failed");
                    1
                }
            };
            report.insert(
                kind.as_str(),
                KindSummary {
                    synced: processed,
                    errors,
                },
            );
        }
        info!(%run_id, "sync run closed");
        Ok(report)
    }

    /// Drive one kind until `has_more` is false, holding the page claim for
    /// the whole drive. Never propagates: failures land in `_sync_obj_run`.
    async fn drive_kind(
        &self,
        run_id: Uuid,
        account: &str,
        kind: ObjectKind,
        created: Option<CreatedFilter>,
    ) -> (u64, Option<SyncError>) {
        if let Err(e) =
            runs::record_object(self.db(), run_id, kind, ObjRunStatus::Running, 0, None).await
        {
            return (0, Some(e));
        }

        let key = advisory_key("backfill", self.db().schema(), account, kind.as_str());
        let result: Result<u64, SyncError> = self
            .db()
            .with_advisory_lock(key, || async move {
                let mut total: u64 = 0;
                loop {
                    let (processed, has_more) = self.page_once(account, kind, created).await?;
                    total += processed;
                    runs::record_object(
                        self.db(),
                        run_id,
                        kind,
                        ObjRunStatus::Running,
                        total,
                        None,
                    )
                    .await?;
                    if !has_more {
                        break;
                    }
                }
                Ok(total)
            })
            .await;

        match result {
            Ok(total) => {
                let err = runs::record_object(
                    self.db(),
                    run_id,
                    kind,
                    ObjRunStatus::Done,
                    total,
                    None,
                )
                .await
                .err();
                (total, err)
            }
            Err(e) => {
                if let Err(rec_err) =
                    runs::record_object_error(self.db(), run_id, kind, &e.to_string()).await
                {
                    warn!(%kind, error = %rec_err, "failed to record kind error");
                }
                (0, Some(e))
            }
        }
    }

    /// Fetch, project, and advance the cursor for one page.
    ///
    /// The cursor row is created on the first page even when the dataset is
    /// empty (`last_synced_object_id` stays null), and the upsert never
    /// rewinds a non-null cursor to null.
    pub(crate) async fn page_once(
        &self,
        account: &str,
        kind: ObjectKind,
        created: Option<CreatedFilter>,
    ) -> Result<(u64, bool), SyncError> {
        let status_table = self.db().table("_sync_status");

        let cursor: Option<String> = sqlx::query(&format!(
            "select last_synced_object_id from {status_table} where resource = $1 and account_id = $2"
        ))
        .bind(kind.as_str())
        .bind(account)
        .fetch_optional(self.db().pool())
        .await
        .map_err(SyncError::from)?
        .and_then(|row| {
            row.try_get::<Option<String>, _>("last_synced_object_id")
                .ok()
                .flatten()
        });

        let params = ListParams {
            starting_after: cursor,
            created_gte: created.and_then(|c| c.gte),
            created_lte: created.and_then(|c| c.lte),
            limit: self.config().page_limit,
        };
        let page = self.client().list(kind, &params).await?;

        let ctx = ProjectCtx {
            db: self.db(),
            client: self.client(),
            account_id: account,
            auto_expand: self.config().auto_expand_lists,
        };
        let mut last_id: Option<String> = None;
        for obj in &page.data {
            project(&ctx, kind, obj).await?;
            if let Some(id) = obj.get("id").and_then(serde_json::Value::as_str) {
                last_id = Some(id.to_string());
            }
        }

        sqlx::query(&format!(
            r#"
            insert into {status_table} as s (resource, account_id, last_synced_object_id)
            values ($1, $2, $3)
            on conflict (resource, account_id) do update set
                last_synced_object_id =
                    coalesce(excluded.last_synced_object_id, s.last_synced_object_id),
                updated_at = now()
            "#
        ))
        .bind(kind.as_str())
        .bind(account)
        .bind(&last_id)
        .execute(self.db().pool())
        .await
        .map_err(SyncError::from)?;

        Ok((page.data.len() as u64, page.has_more))
    }

    /// Resolve which kinds a backfill invocation covers.
    ///
    /// A single-kind request with `backfill_related_entities` pulls in any
    /// ancestor kinds that have no cursor row yet, parents first.
    async fn kinds_to_backfill(
        &self,
        account: &str,
        target: Option<ObjectKind>,
    ) -> Result<Vec<ObjectKind>, SyncError> {
        let Some(target) = target else {
            return Ok(ALL_KINDS.to_vec());
        };
        if !self.config().backfill_related_entities {
            return Ok(vec![target]);
        }

        let status_table = self.db().table("_sync_status");
        let rows = sqlx::query(&format!(
            "select resource from {status_table} where account_id = $1"
        ))
        .bind(account)
        .fetch_all(self.db().pool())
        .await
        .map_err(SyncError::from)?;
        let synced: HashSet<String> = rows
            .into_iter()
            .filter_map(|r| r.try_get("resource").ok())
            .collect();

        let mut wanted: HashSet<ObjectKind> = HashSet::new();
        let mut frontier = vec![target];
        while let Some(kind) = frontier.pop() {
            for parent in parent_kinds(kind) {
                if !synced.contains(parent.as_str()) && wanted.insert(*parent) {
                    frontier.push(*parent);
                }
            }
        }
        wanted.insert(target);

        // Dependency order is the authoritative ordering.
        Ok(ALL_KINDS
            .iter()
            .copied()
            .filter(|k| wanted.contains(k))
            .collect())
    }
}
