//! Account rows and the credential → account-id resolver support.
//!
//! Accounts are inserted lazily: a webhook from an unknown Connect account
//! writes an id-only stub; the acting account's own row is filled from
//! `GET /v1/account` the first time the resolver runs.

use serde_json::Value;
use ssync_db::Db;
use ssync_stripe::types::Account;
use ssync_stripe::StripeError;

use crate::error::SyncError;

/// Id-only row so foreign keys hold for accounts we have only seen in an
/// event envelope.
pub(crate) async fn upsert_account_stub(db: &Db, id: &str) -> Result<(), SyncError> {
    let table = db.table("accounts");
    sqlx::query(&format!(
        "insert into {table} (id) values ($1) on conflict (id) do nothing"
    ))
    .bind(id)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

/// Full upsert from the `account.retrieve` payload. Returns the account id.
pub(crate) async fn upsert_account_full(db: &Db, raw: &Value) -> Result<String, SyncError> {
    let a: Account = serde_json::from_value(raw.clone())
        .map_err(|e| SyncError::Stripe(StripeError::Decode(e.to_string())))?;
    let table = db.table("accounts");

    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, object, business_type, country, default_currency, email,
            charges_enabled, payouts_enabled, details_submitted, created,
            metadata, raw
        ) values ($1, 'account', $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        on conflict (id) do update set
            object            = excluded.object,
            business_type     = excluded.business_type,
            country           = excluded.country,
            default_currency  = excluded.default_currency,
            email             = excluded.email,
            charges_enabled   = excluded.charges_enabled,
            payouts_enabled   = excluded.payouts_enabled,
            details_submitted = excluded.details_submitted,
            created           = coalesce(t.created, excluded.created),
            metadata          = excluded.metadata,
            raw               = excluded.raw,
            last_synced_at    = now(),
            updated_at        = now()
        "#
    ))
    .bind(&a.id)
    .bind(&a.business_type)
    .bind(&a.country)
    .bind(&a.default_currency)
    .bind(&a.email)
    .bind(a.charges_enabled)
    .bind(a.payouts_enabled)
    .bind(a.details_submitted)
    .bind(crate::project::ts(a.created))
    .bind(&a.metadata)
    .bind(raw)
    .execute(db.pool())
    .await
    .map_err(SyncError::from)?;

    Ok(a.id)
}
