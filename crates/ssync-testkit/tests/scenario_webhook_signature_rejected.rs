use serde_json::json;
use ssync_testkit::{count_rows, event_body, harness, signed_header};

#[tokio::test]
async fn bad_signature_writes_nothing() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s4_sig").await? else {
        return Ok(());
    };

    let body = event_body(
        "customer.created",
        None,
        json!({"id": "cus_evil", "object": "customer"}),
    );

    let err = h
        .engine
        .process_webhook(&body, "bad-sig")
        .await
        .expect_err("must reject");
    assert!(err.is_signature());

    // A valid header over a different body must also fail.
    let other = event_body("customer.created", None, json!({"id": "cus_other"}));
    let err = h
        .engine
        .process_webhook(&body, &signed_header(&other))
        .await
        .expect_err("must reject swapped body");
    assert!(err.is_signature());

    assert_eq!(count_rows(&h.db, "customers").await?, 0);
    assert_eq!(count_rows(&h.db, "accounts").await?, 0);

    Ok(())
}

#[tokio::test]
async fn unsupported_event_types_are_acknowledged() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s4_unsupported").await? else {
        return Ok(());
    };

    let body = event_body(
        "customer.discount.created",
        None,
        json!({"id": "di_1", "object": "discount"}),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;

    assert_eq!(count_rows(&h.db, "customers").await?, 0);
    Ok(())
}
