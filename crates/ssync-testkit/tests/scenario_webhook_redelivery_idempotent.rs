use serde_json::json;
use sqlx::Row;
use ssync_testkit::{count_rows, event_body, harness, signed_header};

#[tokio::test]
async fn redelivered_event_is_a_no_op() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_p5_redelivery").await? else {
        return Ok(());
    };

    let body = event_body(
        "customer.created",
        None,
        json!({
            "id": "cus_dup",
            "object": "customer",
            "created": 1_700_000_000,
            "email": "dup@x.test",
            "balance": 50
        }),
    );
    let header = signed_header(&body);

    h.engine.process_webhook(&body, &header).await?;
    h.engine.process_webhook(&body, &header).await?;

    assert_eq!(count_rows(&h.db, "customers").await?, 1);

    let customers = h.db.table("customers");
    let row = sqlx::query(&format!(
        "select email, balance, deleted from {customers} where id = 'cus_dup'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(row.try_get::<Option<String>, _>("email")?.as_deref(), Some("dup@x.test"));
    assert_eq!(row.try_get::<Option<i64>, _>("balance")?, Some(50));
    assert!(!row.try_get::<bool, _>("deleted")?);

    Ok(())
}

#[tokio::test]
async fn tombstone_flags_and_preserves_the_row() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_tombstone").await? else {
        return Ok(());
    };

    let created = event_body(
        "customer.created",
        None,
        json!({"id": "cus_gone", "object": "customer", "email": "gone@x.test"}),
    );
    h.engine
        .process_webhook(&created, &signed_header(&created))
        .await?;

    let deleted = event_body(
        "customer.deleted",
        None,
        json!({"id": "cus_gone", "object": "customer", "deleted": true}),
    );
    h.engine
        .process_webhook(&deleted, &signed_header(&deleted))
        .await?;
    // Redelivery of the tombstone is also fine.
    h.engine
        .process_webhook(&deleted, &signed_header(&deleted))
        .await?;

    let customers = h.db.table("customers");
    let row = sqlx::query(&format!(
        "select email, deleted from {customers} where id = 'cus_gone'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    // Row preserved with its last known fields, only flagged.
    assert_eq!(row.try_get::<Option<String>, _>("email")?.as_deref(), Some("gone@x.test"));
    assert!(row.try_get::<bool, _>("deleted")?);

    Ok(())
}
