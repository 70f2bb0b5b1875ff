use ssync_engine::{BackfillOptions, SyncEngine};
use ssync_testkit::harness;

#[tokio::test]
async fn empty_backfill_completes_with_null_cursors() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s1_empty").await? else {
        return Ok(());
    };

    let report = h
        .engine
        .process_until_done(&BackfillOptions::default())
        .await?;

    for kind in SyncEngine::get_supported_sync_objects() {
        let summary = report.get(kind).expect("every kind reports");
        assert_eq!(summary.synced, 0, "{kind} should sync nothing");
        assert_eq!(summary.errors, 0, "{kind} should not error");
    }

    // Exactly one run, closed.
    let runs = h.db.table("_sync_run");
    let (total, open): (i64, i64) = sqlx::query_as(&format!(
        "select count(*), count(*) filter (where closed_at is null) from {runs}"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(total, 1);
    assert_eq!(open, 0);

    // A cursor row exists per kind, all still null.
    let status = h.db.table("_sync_status");
    let (cursor_rows, non_null): (i64, i64) = sqlx::query_as(&format!(
        "select count(*), count(last_synced_object_id) from {status}"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(cursor_rows as usize, SyncEngine::get_supported_sync_objects().len());
    assert_eq!(non_null, 0);

    // Dashboard derives 'complete'.
    let rows = h.engine.sync_status(10).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "complete");
    assert_eq!(rows[0].processed_total, 0);

    Ok(())
}
