use std::sync::Arc;

use serde_json::json;
use sqlx::Row;
use ssync_config::SyncConfig;
use ssync_engine::SyncEngine;
use ssync_stripe::StripeClient;
use ssync_testkit::{event_body, harness_with, signed_header, MockStripe, TEST_WEBHOOK_SECRET};

const BASE_URL: &str = "https://x.example/stripe-webhooks";

#[tokio::test]
async fn two_accounts_share_a_database_without_bleed() -> anyhow::Result<()> {
    let Some(h) = harness_with("ssync_s6_isolation", "acct_a", |_| {}).await? else {
        return Ok(());
    };

    // Second engine: same database and schema, its own credential.
    let mock_b = Arc::new(MockStripe::new("acct_b"));
    let mut cfg_b = SyncConfig::new("sk_test_b", TEST_WEBHOOK_SECRET);
    cfg_b.schema = h.db.schema().to_string();
    let engine_b = SyncEngine::with_parts(
        cfg_b,
        h.db.clone(),
        mock_b.clone() as Arc<dyn StripeClient>,
    );

    // Each registers the same URL: one endpoint per provider account.
    let hook_a = h.engine.find_or_create_managed_webhook(BASE_URL, None).await?;
    let hook_b = engine_b.find_or_create_managed_webhook(BASE_URL, None).await?;
    assert_eq!(h.mock.endpoint_count(), 1);
    assert_eq!(mock_b.endpoint_count(), 1);

    // Each engine lists only its own registration.
    let list_a = h.engine.list_managed_webhooks().await?;
    let list_b = engine_b.list_managed_webhooks().await?;
    assert_eq!(list_a.len(), 1);
    assert_eq!(list_b.len(), 1);
    assert_eq!(list_a[0].id, hook_a.id);
    assert_eq!(list_b[0].id, hook_b.id);
    assert_eq!(list_a[0].account_id, "acct_a");
    assert_eq!(list_b[0].account_id, "acct_b");

    // Same customer id on both accounts stays two distinct rows.
    for engine in [h.engine.as_ref(), &engine_b] {
        let body = event_body(
            "customer.created",
            None,
            json!({"id": "cus_shared", "object": "customer"}),
        );
        engine.process_webhook(&body, &signed_header(&body)).await?;
    }

    let customers = h.db.table("customers");
    let rows = sqlx::query(&format!(
        "select account_id from {customers} where id = 'cus_shared' order by account_id"
    ))
    .fetch_all(h.db.pool())
    .await?;
    let accounts: Vec<String> = rows
        .iter()
        .map(|r| r.try_get("account_id"))
        .collect::<Result<_, _>>()?;
    assert_eq!(accounts, vec!["acct_a".to_string(), "acct_b".to_string()]);

    Ok(())
}
