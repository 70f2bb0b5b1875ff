use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::Row;
use ssync_testkit::{event_body, harness, signed_header};

#[tokio::test]
async fn invoice_before_customer_writes_a_stub_parent() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s3_stub").await? else {
        return Ok(());
    };

    // Invoice arrives first, referencing a customer we have never seen.
    let body = event_body(
        "invoice.created",
        None,
        json!({
            "id": "in_42",
            "object": "invoice",
            "customer": "cust_999",
            "created": 1_700_000_100,
            "status": "draft",
            "currency": "usd",
            "total": 1200
        }),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;

    let invoices = h.db.table("invoices");
    let inv = sqlx::query(&format!(
        "select customer, status from {invoices} where id = 'in_42' and account_id = 'acct_test'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(inv.try_get::<Option<String>, _>("customer")?.as_deref(), Some("cust_999"));

    // The stub: id + account only, not deleted, no other fields.
    let customers = h.db.table("customers");
    let stub = sqlx::query(&format!(
        "select email, created, deleted, last_synced_at from {customers} where id = 'cust_999'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(stub.try_get::<Option<String>, _>("email")?, None);
    assert_eq!(stub.try_get::<Option<DateTime<Utc>>, _>("created")?, None);
    assert!(!stub.try_get::<bool, _>("deleted")?);
    let stub_synced: DateTime<Utc> = stub.try_get("last_synced_at")?;

    // The real customer event replaces the stub.
    let body = event_body(
        "customer.created",
        None,
        json!({
            "id": "cust_999",
            "object": "customer",
            "created": 1_700_000_000,
            "email": "late@x.test"
        }),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;

    let filled = sqlx::query(&format!(
        "select email, last_synced_at from {customers} where id = 'cust_999'"
    ))
    .fetch_one(h.db.pool())
    .await?;
    assert_eq!(
        filled.try_get::<Option<String>, _>("email")?.as_deref(),
        Some("late@x.test")
    );
    let filled_synced: DateTime<Utc> = filled.try_get("last_synced_at")?;
    assert!(filled_synced >= stub_synced, "last_synced_at must advance");

    // Still exactly one customer row.
    let (n,): (i64,) = sqlx::query_as(&format!("select count(*) from {customers}"))
        .fetch_one(h.db.pool())
        .await?;
    assert_eq!(n, 1);

    Ok(())
}
