use serde_json::json;
use ssync_engine::{BackfillOptions, DeleteAccountOptions, ObjectKind};
use ssync_testkit::{count_rows, event_body, harness, signed_header};

#[tokio::test]
async fn delete_account_removes_every_trace_transactionally() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_delete_account").await? else {
        return Ok(());
    };

    // Populate mirror rows, cursors, and a run.
    h.mock.seed(
        ObjectKind::Customer,
        vec![json!({"id": "cus_1", "object": "customer", "created": 100})],
    );
    h.engine
        .process_until_done(&BackfillOptions::default())
        .await?;

    let body = event_body(
        "invoice.created",
        None,
        json!({"id": "in_1", "object": "invoice", "customer": "cus_1"}),
    );
    h.engine.process_webhook(&body, &signed_header(&body)).await?;
    h.engine
        .find_or_create_managed_webhook("https://x.example/hooks", None)
        .await?;

    let account = h.engine.account_id().await?;

    // Dry run: counts only, nothing removed.
    let dry = h
        .engine
        .dangerously_delete_account(
            &account,
            &DeleteAccountOptions {
                dry_run: true,
                use_transaction: true,
            },
        )
        .await?;
    assert!(dry.dry_run);
    assert_eq!(dry.deleted_rows["customers"], 1);
    assert_eq!(dry.deleted_rows["invoices"], 1);
    assert_eq!(dry.deleted_rows["accounts"], 1);
    assert!(dry.deleted_rows["_sync_status"] > 0);
    assert_eq!(count_rows(&h.db, "customers").await?, 1);

    // Real deletion, all-or-nothing.
    let report = h
        .engine
        .dangerously_delete_account(&account, &DeleteAccountOptions::default())
        .await?;
    assert!(!report.dry_run);
    assert_eq!(report.deleted_rows["customers"], 1);
    assert_eq!(report.deleted_rows["invoices"], 1);

    for table in [
        "customers",
        "invoices",
        "accounts",
        "_sync_status",
        "_sync_run",
        "_sync_obj_run",
        "_managed_webhooks",
    ] {
        assert_eq!(count_rows(&h.db, table).await?, 0, "{table} must be empty");
    }

    Ok(())
}
