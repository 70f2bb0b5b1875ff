use serde_json::json;
use sqlx::Row;
use ssync_engine::{BackfillOptions, ObjectKind};
use ssync_testkit::harness;

#[tokio::test]
async fn failing_kind_is_marked_error_and_the_run_still_closes() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_backfill_error").await? else {
        return Ok(());
    };

    h.mock.seed(
        ObjectKind::Customer,
        vec![json!({"id": "cus_ok", "object": "customer", "created": 100})],
    );
    h.mock.fail_list(ObjectKind::Charge);

    let report = h
        .engine
        .process_until_done(&BackfillOptions::default())
        .await?;

    assert_eq!(report["customer"].synced, 1);
    assert_eq!(report["customer"].errors, 0);
    assert_eq!(report["charge"].errors, 1);

    // The sub-run carries the failure, the run is closed regardless.
    let obj_runs = h.db.table("_sync_obj_run");
    let row = sqlx::query(&format!(
        "select status, error_message from {obj_runs} where object = 'charge'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(row.try_get::<String, _>("status")?, "error");
    let message: Option<String> = row.try_get("error_message")?;
    assert!(message.unwrap_or_default().contains("injected list failure"));

    let runs = h.db.table("_sync_run");
    let (open,): (i64,) = sqlx::query_as(&format!(
        "select count(*) from {runs} where closed_at is null"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(open, 0);

    // Derived status reflects the failed kind.
    let dashboard = h.engine.sync_status(10).await?;
    assert_eq!(dashboard[0].status, "error");
    assert_eq!(dashboard[0].error_objects, 1);

    Ok(())
}

#[tokio::test]
async fn related_parents_are_pulled_into_a_single_kind_backfill() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_related_kinds").await? else {
        return Ok(());
    };

    h.mock.seed(
        ObjectKind::Product,
        vec![json!({"id": "prod_1", "object": "product", "name": "Widget"})],
    );
    h.mock.seed(
        ObjectKind::Price,
        vec![json!({"id": "price_1", "object": "price", "product": "prod_1", "currency": "usd"})],
    );

    let report = h
        .engine
        .process_until_done(&BackfillOptions {
            object: Some(ObjectKind::Price),
            ..Default::default()
        })
        .await?;

    // Never-synced parent rides along; nothing else does.
    assert_eq!(report.len(), 2);
    assert_eq!(report["product"].synced, 1);
    assert_eq!(report["price"].synced, 1);

    let products = h.db.table("products");
    let row = sqlx::query(&format!("select name from {products} where id = 'prod_1'"))
        .fetch_one(h.db.pool())
        .await?;
    assert_eq!(row.try_get::<Option<String>, _>("name")?.as_deref(), Some("Widget"));

    Ok(())
}
