//! Test support: an in-memory [`StripeClient`] with paged fixtures and a
//! webhook-endpoint store, plus a harness that wires it to a real Postgres
//! schema. Scenario tests in `tests/` skip themselves when
//! `SSYNC_DATABASE_URL` is not set.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use ssync_config::{SyncConfig, ENV_DATABASE_URL};
use ssync_db::{run_migrations, Db};
use ssync_engine::SyncEngine;
use ssync_stripe::types::{ListPage, ListParams, WebhookEndpoint, WebhookEndpointCreate};
use ssync_stripe::{webhook, ObjectKind, StripeClient, StripeError};

/// Signing secret shared by the harness config and [`signed_header`].
pub const TEST_WEBHOOK_SECRET: &str = "whsec_testkit_secret";

/// In-memory Stripe. Fixtures are the full ordered object list per kind;
/// `list` pages through them honoring `starting_after`, `limit`, and the
/// `created` range, exactly like the wire protocol.
pub struct MockStripe {
    account: Value,
    state: Mutex<MockState>,
    endpoint_seq: AtomicU64,
}

#[derive(Default)]
struct MockState {
    objects: HashMap<ObjectKind, Vec<Value>>,
    endpoints: BTreeMap<String, WebhookEndpoint>,
    fail_lists: HashSet<ObjectKind>,
    created_endpoints: u64,
}

impl MockStripe {
    pub fn new(account_id: &str) -> Self {
        Self {
            account: json!({
                "id": account_id,
                "object": "account",
                "business_type": "company",
                "country": "US",
                "default_currency": "usd",
                "email": "owner@example.com",
                "charges_enabled": true,
                "payouts_enabled": true,
                "details_submitted": true,
                "created": 1_690_000_000,
            }),
            state: Mutex::new(MockState::default()),
            endpoint_seq: AtomicU64::new(1),
        }
    }

    /// Replace the fixture list for a kind. Order is list-API order.
    pub fn seed(&self, kind: ObjectKind, objects: Vec<Value>) {
        self.state.lock().unwrap().objects.insert(kind, objects);
    }

    /// Make every `list` call for `kind` fail with a transport error.
    pub fn fail_list(&self, kind: ObjectKind) {
        self.state.lock().unwrap().fail_lists.insert(kind);
    }

    pub fn endpoints(&self) -> Vec<WebhookEndpoint> {
        self.state
            .lock()
            .unwrap()
            .endpoints
            .values()
            .cloned()
            .collect()
    }

    pub fn endpoint_count(&self) -> usize {
        self.state.lock().unwrap().endpoints.len()
    }

    /// Total endpoints ever created (deletions don't decrement).
    pub fn created_endpoint_count(&self) -> u64 {
        self.state.lock().unwrap().created_endpoints
    }

    /// Register an endpoint behind the engine's back, as if created by an
    /// older tool or a crashed process.
    pub fn inject_endpoint(&self, endpoint: WebhookEndpoint) {
        self.state
            .lock()
            .unwrap()
            .endpoints
            .insert(endpoint.id.clone(), endpoint);
    }
}

#[async_trait]
impl StripeClient for MockStripe {
    async fn retrieve_account(&self) -> Result<Value, StripeError> {
        Ok(self.account.clone())
    }

    async fn list(&self, kind: ObjectKind, params: &ListParams) -> Result<ListPage, StripeError> {
        let st = self.state.lock().unwrap();
        if st.fail_lists.contains(&kind) {
            return Err(StripeError::Transport("injected list failure".to_string()));
        }

        let all: Vec<Value> = st
            .objects
            .get(&kind)
            .map(|objs| {
                objs.iter()
                    .filter(|o| {
                        let created = o.get("created").and_then(Value::as_i64).unwrap_or(0);
                        params.created_gte.map_or(true, |g| created >= g)
                            && params.created_lte.map_or(true, |l| created <= l)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let start = match &params.starting_after {
            Some(cursor) => all
                .iter()
                .position(|o| o.get("id").and_then(Value::as_str) == Some(cursor.as_str()))
                .map(|i| i + 1)
                .unwrap_or(all.len()),
            None => 0,
        };
        let limit = params.limit.max(1) as usize;
        let data: Vec<Value> = all[start.min(all.len())..].iter().take(limit).cloned().collect();
        let has_more = start + data.len() < all.len();

        Ok(ListPage { data, has_more })
    }

    async fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<Option<Value>, StripeError> {
        let st = self.state.lock().unwrap();
        Ok(st.objects.get(&kind).and_then(|objs| {
            objs.iter()
                .find(|o| o.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn create_webhook_endpoint(
        &self,
        req: &WebhookEndpointCreate,
    ) -> Result<WebhookEndpoint, StripeError> {
        let id = format!("we_mock_{}", self.endpoint_seq.fetch_add(1, Ordering::SeqCst));
        let endpoint: WebhookEndpoint = serde_json::from_value(json!({
            "id": id,
            "url": req.url,
            "status": "enabled",
            "description": req.description,
            "enabled_events": req.enabled_events,
            "metadata": req.metadata.iter().cloned().collect::<BTreeMap<String, String>>(),
        }))
        .map_err(|e| StripeError::Decode(e.to_string()))?;

        let mut st = self.state.lock().unwrap();
        st.created_endpoints += 1;
        st.endpoints.insert(endpoint.id.clone(), endpoint.clone());
        Ok(endpoint)
    }

    async fn retrieve_webhook_endpoint(
        &self,
        id: &str,
    ) -> Result<Option<WebhookEndpoint>, StripeError> {
        Ok(self.state.lock().unwrap().endpoints.get(id).cloned())
    }

    async fn delete_webhook_endpoint(&self, id: &str) -> Result<bool, StripeError> {
        Ok(self.state.lock().unwrap().endpoints.remove(id).is_some())
    }

    async fn list_webhook_endpoints(
        &self,
        starting_after: Option<&str>,
    ) -> Result<(Vec<WebhookEndpoint>, bool), StripeError> {
        let st = self.state.lock().unwrap();
        let endpoints: Vec<WebhookEndpoint> = match starting_after {
            None => st.endpoints.values().cloned().collect(),
            Some(cursor) => st
                .endpoints
                .range::<str, _>((
                    std::ops::Bound::Excluded(cursor),
                    std::ops::Bound::Unbounded,
                ))
                .map(|(_, v)| v.clone())
                .collect(),
        };
        Ok((endpoints, false))
    }
}

// ---------------------------------------------------------------------------
// Event fixtures
// ---------------------------------------------------------------------------

/// Serialized event envelope for [`SyncEngine::process_webhook`].
pub fn event_body(event_type: &str, account: Option<&str>, object: Value) -> Vec<u8> {
    let mut envelope = json!({
        "id": format!("evt_{}", event_type.replace('.', "_")),
        "object": "event",
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": {"object": object}
    });
    if let Some(account) = account {
        envelope["account"] = json!(account);
    }
    serde_json::to_vec(&envelope).expect("event envelope serializes")
}

/// Valid `Stripe-Signature` header for `body` under [`TEST_WEBHOOK_SECRET`].
pub fn signed_header(body: &[u8]) -> String {
    webhook::sign_payload(body, TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub engine: Arc<SyncEngine>,
    pub mock: Arc<MockStripe>,
    pub db: Db,
}

/// Build an engine against a dedicated schema in the configured database.
/// Returns `None` (after printing a SKIP note) when no database is set.
pub async fn harness(schema: &str) -> anyhow::Result<Option<TestHarness>> {
    harness_with(schema, "acct_test", |_| {}).await
}

pub async fn harness_with(
    schema: &str,
    account_id: &str,
    tune: impl FnOnce(&mut SyncConfig),
) -> anyhow::Result<Option<TestHarness>> {
    let url = match std::env::var(ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {ENV_DATABASE_URL} not set");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new().max_connections(8).connect(&url).await?;
    let db = Db::from_pool(pool, schema);

    // Fresh schema per scenario; scenarios never share state.
    sqlx::query(&format!("drop schema if exists \"{schema}\" cascade"))
        .execute(db.pool())
        .await?;
    run_migrations(&db).await?;

    let mock = Arc::new(MockStripe::new(account_id));
    let mut cfg = SyncConfig::new("sk_test_testkit", TEST_WEBHOOK_SECRET);
    cfg.schema = schema.to_string();
    tune(&mut cfg);
    cfg.validate()?;

    let engine = Arc::new(SyncEngine::with_parts(
        cfg,
        db.clone(),
        mock.clone() as Arc<dyn StripeClient>,
    ));

    Ok(Some(TestHarness { engine, mock, db }))
}

/// Row count helper for assertions.
pub async fn count_rows(db: &Db, table: &str) -> anyhow::Result<i64> {
    let qualified = db.table(table);
    let (n,): (i64,) = sqlx::query_as(&format!("select count(*) from {qualified}"))
        .fetch_one(db.pool())
        .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_pages_respect_cursor_and_limit() {
        let mock = MockStripe::new("acct_1");
        mock.seed(
            ObjectKind::Customer,
            vec![
                json!({"id": "cus_1", "created": 100}),
                json!({"id": "cus_2", "created": 200}),
                json!({"id": "cus_3", "created": 300}),
            ],
        );

        let page = mock
            .list(
                ObjectKind::Customer,
                &ListParams {
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_more);

        let page2 = mock
            .list(
                ObjectKind::Customer,
                &ListParams {
                    limit: 2,
                    starting_after: Some("cus_2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page2.data.len(), 1);
        assert!(!page2.has_more);
        assert_eq!(page2.data[0]["id"], "cus_3");
    }

    #[tokio::test]
    async fn mock_created_filter_applies() {
        let mock = MockStripe::new("acct_1");
        mock.seed(
            ObjectKind::Charge,
            vec![
                json!({"id": "ch_1", "created": 100}),
                json!({"id": "ch_2", "created": 200}),
            ],
        );
        let page = mock
            .list(
                ObjectKind::Charge,
                &ListParams {
                    limit: 10,
                    created_gte: Some(150),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0]["id"], "ch_2");
    }

    #[tokio::test]
    async fn signed_events_verify() {
        let body = event_body("customer.created", None, json!({"id": "cus_1"}));
        let header = signed_header(&body);
        let event = webhook::construct_event(&body, &header, TEST_WEBHOOK_SECRET).unwrap();
        assert_eq!(event.event_type, "customer.created");
    }
}
