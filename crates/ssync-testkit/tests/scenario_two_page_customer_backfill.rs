use serde_json::json;
use sqlx::Row;
use ssync_engine::ObjectKind;
use ssync_testkit::harness_with;

async fn cursor_for(db: &ssync_db::Db, resource: &str) -> anyhow::Result<Option<String>> {
    let status = db.table("_sync_status");
    let row = sqlx::query(&format!(
        "select last_synced_object_id from {status} where resource = $1 and account_id = 'acct_test'"
    ))
    .bind(resource)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.and_then(|r| r.try_get("last_synced_object_id").ok()))
}

#[tokio::test]
async fn two_pages_land_three_customers_and_park_the_cursor() -> anyhow::Result<()> {
    let Some(h) = harness_with("ssync_s2_pages", "acct_test", |cfg| {
        cfg.page_limit = 2;
    })
    .await?
    else {
        return Ok(());
    };

    h.mock.seed(
        ObjectKind::Customer,
        vec![
            json!({"id": "cus_1", "object": "customer", "created": 100, "email": "one@x.test"}),
            json!({"id": "cus_2", "object": "customer", "created": 200, "email": "two@x.test"}),
            json!({"id": "cus_3", "object": "customer", "created": 300, "email": "three@x.test"}),
        ],
    );

    // Page 1: two customers, more to come; cursor parks on the page tail.
    let first = h.engine.process_next(ObjectKind::Customer).await?;
    assert_eq!(first.processed, 2);
    assert!(first.has_more);
    assert_eq!(cursor_for(&h.db, "customer").await?.as_deref(), Some("cus_2"));

    // Page 2: the remainder.
    let second = h.engine.process_next(ObjectKind::Customer).await?;
    assert_eq!(second.processed, 1);
    assert!(!second.has_more);
    assert_eq!(cursor_for(&h.db, "customer").await?.as_deref(), Some("cus_3"));

    // Done state: nothing further, cursor never rewinds.
    let third = h.engine.process_next(ObjectKind::Customer).await?;
    assert_eq!(third.processed, 0);
    assert!(!third.has_more);
    assert_eq!(cursor_for(&h.db, "customer").await?.as_deref(), Some("cus_3"));

    let customers = h.db.table("customers");
    let rows = sqlx::query(&format!(
        "select id, account_id, email from {customers} order by id"
    ))
    .fetch_all(h.db.pool())
    .await?;
    assert_eq!(rows.len(), 3);
    for (row, expected) in rows.iter().zip(["cus_1", "cus_2", "cus_3"]) {
        assert_eq!(row.try_get::<String, _>("id")?, expected);
        assert_eq!(row.try_get::<String, _>("account_id")?, "acct_test");
    }

    Ok(())
}
