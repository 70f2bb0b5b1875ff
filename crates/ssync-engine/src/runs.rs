//! Sync-run coordinator: run rows, per-object sub-runs, dashboard reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use ssync_db::Db;
use ssync_stripe::ObjectKind;
use uuid::Uuid;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjRunStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl ObjRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjRunStatus::Pending => "pending",
            ObjRunStatus::Running => "running",
            ObjRunStatus::Done => "done",
            ObjRunStatus::Error => "error",
        }
    }
}

/// Open a run for the account. The partial unique index on
/// `_sync_run (account_id) where closed_at is null` is the arbiter: a
/// conflict means another run is open and surfaces as `ConcurrentRun`.
pub(crate) async fn open_run(
    db: &Db,
    account_id: &str,
    max_concurrent: usize,
    triggered_by: &str,
) -> Result<Uuid, SyncError> {
    let table = db.table("_sync_run");
    let run_id = Uuid::new_v4();

    sqlx::query(&format!(
        "insert into {table} (id, account_id, max_concurrent, triggered_by) values ($1, $2, $3, $4)"
    ))
    .bind(run_id)
    .bind(account_id)
    .bind(max_concurrent as i32)
    .bind(triggered_by)
    .execute(db.pool())
    .await
    .map_err(|e| {
        let db_err = ssync_db::DbError::from(e);
        if db_err.is_constraint_conflict() {
            SyncError::ConcurrentRun {
                account_id: account_id.to_string(),
            }
        } else {
            SyncError::Db(db_err)
        }
    })?;

    Ok(run_id)
}

pub(crate) async fn close_run(db: &Db, run_id: Uuid) -> Result<(), SyncError> {
    let table = db.table("_sync_run");
    sqlx::query(&format!(
        "update {table} set completed_at = coalesce(completed_at, now()), closed_at = now() where id = $1"
    ))
    .bind(run_id)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

pub(crate) async fn record_object(
    db: &Db,
    run_id: Uuid,
    kind: ObjectKind,
    status: ObjRunStatus,
    processed: u64,
    error_message: Option<&str>,
) -> Result<(), SyncError> {
    let table = db.table("_sync_obj_run");
    sqlx::query(&format!(
        r#"
        insert into {table} (run_id, object, status, processed_count, error_message)
        values ($1, $2, $3, $4, $5)
        on conflict (run_id, object) do update set
            status          = excluded.status,
            processed_count = excluded.processed_count,
            error_message   = excluded.error_message,
            updated_at      = now()
        "#
    ))
    .bind(run_id)
    .bind(kind.as_str())
    .bind(status.as_str())
    .bind(processed as i32)
    .bind(error_message)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

/// Flag a kind as errored while keeping whatever processed count the last
/// page commit recorded.
pub(crate) async fn record_object_error(
    db: &Db,
    run_id: Uuid,
    kind: ObjectKind,
    error_message: &str,
) -> Result<(), SyncError> {
    let table = db.table("_sync_obj_run");
    sqlx::query(&format!(
        r#"
        insert into {table} (run_id, object, status, error_message)
        values ($1, $2, 'error', $3)
        on conflict (run_id, object) do update set
            status        = 'error',
            error_message = excluded.error_message,
            updated_at    = now()
        "#
    ))
    .bind(run_id)
    .bind(kind.as_str())
    .bind(error_message)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

/// One `sync_dashboard` row.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardRow {
    pub run_id: Uuid,
    pub account_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    pub status: String,
    pub processed_total: i64,
    pub error_objects: i64,
}

/// Recent runs for one account, newest first.
pub async fn dashboard(
    db: &Db,
    account_id: &str,
    limit: i64,
) -> Result<Vec<DashboardRow>, SyncError> {
    let view = db.table("sync_dashboard");
    let rows = sqlx::query(&format!(
        "select * from {view} where account_id = $1 order by started_at desc limit $2"
    ))
    .bind(account_id)
    .bind(limit)
    .fetch_all(db.pool())
    .await
    .map_err(SyncError::from)?;

    rows.into_iter()
        .map(|row| {
            Ok(DashboardRow {
                run_id: row.try_get("run_id")?,
                account_id: row.try_get("account_id")?,
                started_at: row.try_get("started_at")?,
                completed_at: row.try_get("completed_at")?,
                closed_at: row.try_get("closed_at")?,
                triggered_by: row.try_get("triggered_by")?,
                status: row.try_get("status")?,
                processed_total: row.try_get("processed_total")?,
                error_objects: row.try_get("error_objects")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_the_check_constraint() {
        assert_eq!(ObjRunStatus::Pending.as_str(), "pending");
        assert_eq!(ObjRunStatus::Running.as_str(), "running");
        assert_eq!(ObjRunStatus::Done.as_str(), "done");
        assert_eq!(ObjRunStatus::Error.as_str(), "error");
    }
}
