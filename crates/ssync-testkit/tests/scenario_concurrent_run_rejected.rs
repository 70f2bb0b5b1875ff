use ssync_engine::BackfillOptions;
use ssync_testkit::harness;
use uuid::Uuid;

#[tokio::test]
async fn second_run_is_rejected_while_one_is_open() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_concurrent_run").await? else {
        return Ok(());
    };

    // Materialize the account row, then hold a run open as another worker
    // would.
    let account = h.engine.account_id().await?;
    let runs = h.db.table("_sync_run");
    let other_run = Uuid::new_v4();
    sqlx::query(&format!(
        "insert into {runs} (id, account_id, triggered_by) values ($1, $2, 'test-worker')"
    ))
    .bind(other_run)
    .bind(&account)
    .execute(h.db.pool())
    .await?;

    let err = h
        .engine
        .process_until_done(&BackfillOptions::default())
        .await
        .expect_err("open run must block a second one");
    assert!(err.is_concurrent_run(), "got: {err}");

    // Closing the stale run unblocks the account.
    sqlx::query(&format!("update {runs} set closed_at = now() where id = $1"))
        .bind(other_run)
        .execute(h.db.pool())
        .await?;

    let report = h
        .engine
        .process_until_done(&BackfillOptions::default())
        .await?;
    assert!(report.values().all(|s| s.errors == 0));

    Ok(())
}
