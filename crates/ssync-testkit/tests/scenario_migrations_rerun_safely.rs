use ssync_db::{migrations, run_migrations};
use ssync_testkit::harness;

#[tokio::test]
async fn migrations_apply_once_and_rerun_as_noops() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_migrations").await? else {
        return Ok(());
    };

    // The harness migrated once; a second and third pass must change nothing.
    run_migrations(&h.db).await?;
    run_migrations(&h.db).await?;

    let ledger = h.db.table("_migrations");
    let (total, distinct): (i64, i64) = sqlx::query_as(&format!(
        "select count(*), count(distinct name) from {ledger}"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(total as usize, migrations().len());
    assert_eq!(distinct, total, "ledger names must stay unique");

    // Spot-check the namespace actually materialized.
    let (tables,): (i64,) = sqlx::query_as(
        "select count(*) from information_schema.tables where table_schema = $1",
    )
    .bind(h.db.schema())
    .fetch_one(h.db.pool())
    .await?;
    // 17 mirror tables + 2 sub-entity tables + accounts + 4 infra tables.
    assert!(tables >= 24, "expected the full table set, got {tables}");

    let status = h.db.status().await?;
    assert!(status.ok);
    assert!(status.migrated);

    Ok(())
}
