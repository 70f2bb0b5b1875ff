//! Entity projectors: one upsert routine per object kind.
//!
//! Every projector follows the same contract: parse the raw payload into its
//! column view, open one transaction, stub any referenced parents so foreign
//! keys hold regardless of arrival order, upsert on `(account_id, id)`, and
//! commit. Sub-entities (invoice lines, subscription items) ride in the
//! parent's transaction. Projectors are idempotent — redelivery and page
//! replay are the normal case, not the exception.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgConnection;
use ssync_db::Db;
use ssync_stripe::types::Expandable;
use ssync_stripe::{ObjectKind, StripeClient};

use crate::error::SyncError;
use crate::objects::table_name;

mod billing;
mod core;
mod payments;

/// Everything a projector needs. Cheap to copy; `auto_expand` is flipped off
/// for nested projections so expansion stays single-hop.
#[derive(Clone, Copy)]
pub struct ProjectCtx<'a> {
    pub db: &'a Db,
    pub client: &'a dyn StripeClient,
    pub account_id: &'a str,
    pub auto_expand: bool,
}

impl<'a> ProjectCtx<'a> {
    pub(crate) fn without_expand(self) -> Self {
        Self {
            auto_expand: false,
            ..self
        }
    }
}

/// Project one provider object into its mirror table.
pub async fn project(ctx: &ProjectCtx<'_>, kind: ObjectKind, raw: &Value) -> Result<(), SyncError> {
    match kind {
        ObjectKind::Product => core::upsert_product(ctx, raw).await,
        ObjectKind::Price => core::upsert_price(ctx, raw).await,
        ObjectKind::Plan => core::upsert_plan(ctx, raw).await,
        ObjectKind::Customer => core::upsert_customer(ctx, raw).await,
        ObjectKind::PaymentMethod => core::upsert_payment_method(ctx, raw).await,
        ObjectKind::Subscription => billing::upsert_subscription(ctx, raw).await,
        ObjectKind::SubscriptionSchedule => billing::upsert_subscription_schedule(ctx, raw).await,
        ObjectKind::Invoice => billing::upsert_invoice(ctx, raw).await,
        ObjectKind::CreditNote => billing::upsert_credit_note(ctx, raw).await,
        ObjectKind::TaxId => billing::upsert_tax_id(ctx, raw).await,
        ObjectKind::CheckoutSession => payments::upsert_checkout_session(ctx, raw).await,
        ObjectKind::Charge => payments::upsert_charge(ctx, raw).await,
        ObjectKind::PaymentIntent => payments::upsert_payment_intent(ctx, raw).await,
        ObjectKind::SetupIntent => payments::upsert_setup_intent(ctx, raw).await,
        ObjectKind::Refund => payments::upsert_refund(ctx, raw).await,
        ObjectKind::Dispute => payments::upsert_dispute(ctx, raw).await,
        ObjectKind::EarlyFraudWarning => payments::upsert_early_fraud_warning(ctx, raw).await,
    }
}

/// Soft-delete: flag the row, never remove it. Unknown ids still get a
/// flagged stub so a later backfill cannot resurrect state we know is gone.
pub async fn tombstone(
    db: &Db,
    kind: ObjectKind,
    account_id: &str,
    id: &str,
) -> Result<(), SyncError> {
    let table = db.table(table_name(kind));
    sqlx::query(&format!(
        r#"
        insert into {table} (id, account_id, deleted)
        values ($1, $2, true)
        on conflict (account_id, id) do update
          set deleted        = true,
              last_synced_at = now(),
              updated_at     = now()
        "#
    ))
    .bind(id)
    .bind(account_id)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

/// Minimal parent row so a child's foreign key holds when events arrive out
/// of natural order. The stub is replaced by the parent's own projection.
pub(crate) async fn ensure_stub(
    conn: &mut PgConnection,
    db: &Db,
    kind: ObjectKind,
    account_id: &str,
    id: &str,
) -> Result<(), SyncError> {
    let table = db.table(table_name(kind));
    sqlx::query(&format!(
        "insert into {table} (id, account_id) values ($1, $2) on conflict (account_id, id) do nothing"
    ))
    .bind(id)
    .bind(account_id)
    .execute(conn)
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

pub(crate) fn parse<T: DeserializeOwned>(kind: ObjectKind, raw: &Value) -> Result<T, SyncError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        SyncError::projection(
            kind,
            raw.get("id").and_then(Value::as_str),
            format!("payload did not match the {kind} shape: {e}"),
        )
    })
}

/// Provider epoch seconds to a column value.
pub(crate) fn ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

pub(crate) fn exp_id(e: &Option<Expandable>) -> Option<String> {
    e.as_ref().and_then(Expandable::id).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ssync_stripe::types::Customer;

    #[test]
    fn parse_reports_the_offending_object() {
        // `email` must be a string; a number breaks the column view.
        let raw = json!({"id": "cus_1", "email": 42});
        let err = parse::<Customer>(ObjectKind::Customer, &raw).unwrap_err();
        match err {
            SyncError::Projection {
                kind, object_id, ..
            } => {
                assert_eq!(kind, ObjectKind::Customer);
                assert_eq!(object_id.as_deref(), Some("cus_1"));
            }
            other => panic!("expected projection error, got {other}"),
        }
    }

    #[test]
    fn ts_maps_epoch_and_none() {
        assert!(ts(None).is_none());
        let t = ts(Some(1_700_000_000)).unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn exp_id_reads_bare_and_expanded() {
        let bare: Option<Expandable> = serde_json::from_value(json!("cus_9")).ok();
        assert_eq!(exp_id(&bare).as_deref(), Some("cus_9"));
        let expanded: Option<Expandable> =
            serde_json::from_value(json!({"id": "cus_9"})).ok();
        assert_eq!(exp_id(&expanded).as_deref(), Some("cus_9"));
        assert_eq!(exp_id(&None), None);
    }
}
