use serde_json::json;
use sqlx::Row;
use ssync_testkit::{count_rows, event_body, harness_with, signed_header};

#[tokio::test]
async fn invoice_lines_ride_in_the_parent_transaction() -> anyhow::Result<()> {
    let Some(h) = harness_with("ssync_expand_lines", "acct_test", |cfg| {
        cfg.auto_expand_lists = true;
    })
    .await?
    else {
        return Ok(());
    };

    let body = event_body(
        "invoice.created",
        None,
        json!({
            "id": "in_exp",
            "object": "invoice",
            "customer": "cus_exp",
            "total": 3000,
            "lines": {
                "object": "list",
                "data": [
                    {"id": "il_1", "object": "line_item", "amount": 1000, "currency": "usd"},
                    {"id": "il_2", "object": "line_item", "amount": 2000, "currency": "usd"}
                ],
                "has_more": false
            }
        }),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;

    assert_eq!(count_rows(&h.db, "invoices").await?, 1);
    assert_eq!(count_rows(&h.db, "invoice_line_items").await?, 2);

    let lines = h.db.table("invoice_line_items");
    let rows = sqlx::query(&format!(
        "select id, invoice, amount from {lines} order by id"
    ))
    .fetch_all(h.db.pool())
    .await?;
    for row in &rows {
        assert_eq!(row.try_get::<Option<String>, _>("invoice")?.as_deref(), Some("in_exp"));
    }
    assert_eq!(rows[0].try_get::<Option<i64>, _>("amount")?, Some(1000));

    Ok(())
}

#[tokio::test]
async fn sublists_are_skipped_when_expansion_is_off() -> anyhow::Result<()> {
    let Some(h) = harness_with("ssync_expand_off", "acct_test", |_| {}).await? else {
        return Ok(());
    };

    let body = event_body(
        "customer.subscription.created",
        None,
        json!({
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_1",
            "status": "active",
            "items": {
                "object": "list",
                "data": [{"id": "si_1", "object": "subscription_item", "subscription": "sub_1"}],
                "has_more": false
            }
        }),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;

    assert_eq!(count_rows(&h.db, "subscriptions").await?, 1);
    assert_eq!(count_rows(&h.db, "subscription_items").await?, 0);

    Ok(())
}
