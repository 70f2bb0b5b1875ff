use std::collections::HashSet;

use futures_util::future::join_all;
use ssync_testkit::{count_rows, harness};

const BASE_URL: &str = "https://x.example/stripe-webhooks";

#[tokio::test]
async fn five_concurrent_callers_converge_on_one_endpoint() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s5_race").await? else {
        return Ok(());
    };

    let tasks = (0..5).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.find_or_create_managed_webhook(BASE_URL, None).await })
    });
    let results = join_all(tasks).await;

    let mut ids = HashSet::new();
    for joined in results {
        let webhook = joined.expect("task panicked")?;
        assert_eq!(webhook.url, BASE_URL);
        ids.insert(webhook.id);
    }
    assert_eq!(ids.len(), 1, "all callers must receive the same endpoint");

    // Exactly one endpoint ever created on the provider, one local row.
    assert_eq!(h.mock.created_endpoint_count(), 1);
    assert_eq!(h.mock.endpoint_count(), 1);
    assert_eq!(count_rows(&h.db, "_managed_webhooks").await?, 1);

    let endpoint = &h.mock.endpoints()[0];
    assert_eq!(endpoint.url, BASE_URL);
    assert_eq!(endpoint.managed_by(), Some("stripe-sync"));
    assert_eq!(endpoint.enabled_events, vec!["*".to_string()]);

    // A later call still returns the same endpoint without creating.
    let again = h.engine.find_or_create_managed_webhook(BASE_URL, None).await?;
    assert!(ids.contains(&again.id));
    assert_eq!(h.mock.created_endpoint_count(), 1);

    Ok(())
}

#[tokio::test]
async fn orphaned_provider_endpoints_are_reaped() -> anyhow::Result<()> {
    let Some(h) = harness("ssync_s5_orphan").await? else {
        return Ok(());
    };

    // An endpoint claiming to be ours, with no local row (crashed process).
    h.mock.inject_endpoint(
        serde_json::from_value(serde_json::json!({
            "id": "we_stale",
            "url": "https://old.example/hooks",
            "description": "stripe-sync-cli development webhook",
            "enabled_events": ["*"],
            "metadata": {}
        }))
        .unwrap(),
    );

    let webhook = h.engine.find_or_create_managed_webhook(BASE_URL, None).await?;

    let ids: Vec<String> = h.mock.endpoints().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec![webhook.id.clone()], "stale endpoint must be gone");
    assert_eq!(count_rows(&h.db, "_managed_webhooks").await?, 1);

    h.engine.delete_managed_webhook(&webhook.id).await?;
    assert_eq!(h.mock.endpoint_count(), 0);
    assert_eq!(count_rows(&h.db, "_managed_webhooks").await?, 0);
    // Deleting again is tolerated on both sides.
    h.engine.delete_managed_webhook(&webhook.id).await?;

    Ok(())
}
