//! Projectors for payment-side kinds.

use serde_json::Value;
use ssync_stripe::types::{
    Charge, CheckoutSession, Dispute, EarlyFraudWarning, PaymentIntent, Refund, SetupIntent,
};
use ssync_stripe::ObjectKind;

use crate::error::SyncError;
use crate::objects::table_name;

use super::{ensure_stub, exp_id, parse, ts, ProjectCtx};

pub(super) async fn upsert_charge(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let c: Charge = parse(ObjectKind::Charge, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Charge));
    let customer = exp_id(&c.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, invoice, payment_intent,
            payment_method, amount, amount_captured, amount_refunded, currency,
            captured, paid, refunded, disputed, status, description,
            failure_code, failure_message, receipt_url, billing_details,
            metadata, raw
        ) values ($1, $2, 'charge', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
        on conflict (account_id, id) do update set
            object          = excluded.object,
            created         = coalesce(t.created, excluded.created),
            customer        = excluded.customer,
            invoice         = excluded.invoice,
            payment_intent  = excluded.payment_intent,
            payment_method  = excluded.payment_method,
            amount          = excluded.amount,
            amount_captured = excluded.amount_captured,
            amount_refunded = excluded.amount_refunded,
            currency        = excluded.currency,
            captured        = excluded.captured,
            paid            = excluded.paid,
            refunded        = excluded.refunded,
            disputed        = excluded.disputed,
            status          = excluded.status,
            description     = excluded.description,
            failure_code    = excluded.failure_code,
            failure_message = excluded.failure_message,
            receipt_url     = excluded.receipt_url,
            billing_details = excluded.billing_details,
            metadata        = excluded.metadata,
            raw             = excluded.raw,
            last_synced_at  = now(),
            updated_at      = now()
        "#
    ))
    .bind(&c.id)
    .bind(ctx.account_id)
    .bind(ts(c.created))
    .bind(&customer)
    .bind(exp_id(&c.invoice))
    .bind(exp_id(&c.payment_intent))
    .bind(&c.payment_method)
    .bind(c.amount)
    .bind(c.amount_captured)
    .bind(c.amount_refunded)
    .bind(&c.currency)
    .bind(c.captured)
    .bind(c.paid)
    .bind(c.refunded)
    .bind(c.disputed)
    .bind(&c.status)
    .bind(&c.description)
    .bind(&c.failure_code)
    .bind(&c.failure_message)
    .bind(&c.receipt_url)
    .bind(&c.billing_details)
    .bind(&c.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_payment_intent(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let pi: PaymentIntent = parse(ObjectKind::PaymentIntent, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::PaymentIntent));
    let customer = exp_id(&pi.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, invoice, latest_charge,
            payment_method, amount, amount_capturable, amount_received,
            currency, status, capture_method, cancellation_reason, canceled_at,
            description, receipt_email, metadata, raw
        ) values ($1, $2, 'payment_intent', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        on conflict (account_id, id) do update set
            object              = excluded.object,
            created             = coalesce(t.created, excluded.created),
            customer            = excluded.customer,
            invoice             = excluded.invoice,
            latest_charge       = excluded.latest_charge,
            payment_method      = excluded.payment_method,
            amount              = excluded.amount,
            amount_capturable   = excluded.amount_capturable,
            amount_received     = excluded.amount_received,
            currency            = excluded.currency,
            status              = excluded.status,
            capture_method      = excluded.capture_method,
            cancellation_reason = excluded.cancellation_reason,
            canceled_at         = excluded.canceled_at,
            description         = excluded.description,
            receipt_email       = excluded.receipt_email,
            metadata            = excluded.metadata,
            raw                 = excluded.raw,
            last_synced_at      = now(),
            updated_at          = now()
        "#
    ))
    .bind(&pi.id)
    .bind(ctx.account_id)
    .bind(ts(pi.created))
    .bind(&customer)
    .bind(exp_id(&pi.invoice))
    .bind(exp_id(&pi.latest_charge))
    .bind(exp_id(&pi.payment_method))
    .bind(pi.amount)
    .bind(pi.amount_capturable)
    .bind(pi.amount_received)
    .bind(&pi.currency)
    .bind(&pi.status)
    .bind(&pi.capture_method)
    .bind(&pi.cancellation_reason)
    .bind(ts(pi.canceled_at))
    .bind(&pi.description)
    .bind(&pi.receipt_email)
    .bind(&pi.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_setup_intent(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let si: SetupIntent = parse(ObjectKind::SetupIntent, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::SetupIntent));
    let customer = exp_id(&si.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, payment_method, status,
            usage, cancellation_reason, latest_attempt, description, metadata,
            raw
        ) values ($1, $2, 'setup_intent', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        on conflict (account_id, id) do update set
            object              = excluded.object,
            created             = coalesce(t.created, excluded.created),
            customer            = excluded.customer,
            payment_method      = excluded.payment_method,
            status              = excluded.status,
            usage               = excluded.usage,
            cancellation_reason = excluded.cancellation_reason,
            latest_attempt      = excluded.latest_attempt,
            description         = excluded.description,
            metadata            = excluded.metadata,
            raw                 = excluded.raw,
            last_synced_at      = now(),
            updated_at          = now()
        "#
    ))
    .bind(&si.id)
    .bind(ctx.account_id)
    .bind(ts(si.created))
    .bind(&customer)
    .bind(exp_id(&si.payment_method))
    .bind(&si.status)
    .bind(&si.usage)
    .bind(&si.cancellation_reason)
    .bind(exp_id(&si.latest_attempt))
    .bind(&si.description)
    .bind(&si.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_refund(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let r: Refund = parse(ObjectKind::Refund, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Refund));
    let charge = exp_id(&r.charge);

    let mut tx = ctx.db.begin().await?;
    if let Some(charge) = &charge {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Charge, ctx.account_id, charge).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, charge, payment_intent, amount,
            currency, reason, receipt_number, status, balance_transaction,
            metadata, raw
        ) values ($1, $2, 'refund', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        on conflict (account_id, id) do update set
            object              = excluded.object,
            created             = coalesce(t.created, excluded.created),
            charge              = excluded.charge,
            payment_intent      = excluded.payment_intent,
            amount              = excluded.amount,
            currency            = excluded.currency,
            reason              = excluded.reason,
            receipt_number      = excluded.receipt_number,
            status              = excluded.status,
            balance_transaction = excluded.balance_transaction,
            metadata            = excluded.metadata,
            raw                 = excluded.raw,
            last_synced_at      = now(),
            updated_at          = now()
        "#
    ))
    .bind(&r.id)
    .bind(ctx.account_id)
    .bind(ts(r.created))
    .bind(&charge)
    .bind(exp_id(&r.payment_intent))
    .bind(r.amount)
    .bind(&r.currency)
    .bind(&r.reason)
    .bind(&r.receipt_number)
    .bind(&r.status)
    .bind(exp_id(&r.balance_transaction))
    .bind(&r.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_dispute(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let d: Dispute = parse(ObjectKind::Dispute, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Dispute));
    let charge = exp_id(&d.charge);

    let mut tx = ctx.db.begin().await?;
    if let Some(charge) = &charge {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Charge, ctx.account_id, charge).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, charge, payment_intent, amount,
            currency, reason, status, is_charge_refundable, evidence_details,
            metadata, raw
        ) values ($1, $2, 'dispute', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        on conflict (account_id, id) do update set
            object               = excluded.object,
            created              = coalesce(t.created, excluded.created),
            charge               = excluded.charge,
            payment_intent       = excluded.payment_intent,
            amount               = excluded.amount,
            currency             = excluded.currency,
            reason               = excluded.reason,
            status               = excluded.status,
            is_charge_refundable = excluded.is_charge_refundable,
            evidence_details     = excluded.evidence_details,
            metadata             = excluded.metadata,
            raw                  = excluded.raw,
            last_synced_at       = now(),
            updated_at           = now()
        "#
    ))
    .bind(&d.id)
    .bind(ctx.account_id)
    .bind(ts(d.created))
    .bind(&charge)
    .bind(exp_id(&d.payment_intent))
    .bind(d.amount)
    .bind(&d.currency)
    .bind(&d.reason)
    .bind(&d.status)
    .bind(d.is_charge_refundable)
    .bind(&d.evidence_details)
    .bind(&d.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_early_fraud_warning(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let w: EarlyFraudWarning = parse(ObjectKind::EarlyFraudWarning, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::EarlyFraudWarning));
    let charge = exp_id(&w.charge);

    let mut tx = ctx.db.begin().await?;
    if let Some(charge) = &charge {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Charge, ctx.account_id, charge).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, charge, payment_intent,
            fraud_type, actionable, raw
        ) values ($1, $2, 'radar.early_fraud_warning', $3, $4, $5, $6, $7, $8)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            charge         = excluded.charge,
            payment_intent = excluded.payment_intent,
            fraud_type     = excluded.fraud_type,
            actionable     = excluded.actionable,
            raw            = excluded.raw,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&w.id)
    .bind(ctx.account_id)
    .bind(ts(w.created))
    .bind(&charge)
    .bind(exp_id(&w.payment_intent))
    .bind(&w.fraud_type)
    .bind(w.actionable)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_checkout_session(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let cs: CheckoutSession = parse(ObjectKind::CheckoutSession, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::CheckoutSession));
    let customer = exp_id(&cs.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, customer_email, mode,
            payment_intent, payment_status, status, subscription,
            amount_subtotal, amount_total, currency, success_url, cancel_url,
            metadata, raw
        ) values ($1, $2, 'checkout.session', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        on conflict (account_id, id) do update set
            object          = excluded.object,
            created         = coalesce(t.created, excluded.created),
            customer        = excluded.customer,
            customer_email  = excluded.customer_email,
            mode            = excluded.mode,
            payment_intent  = excluded.payment_intent,
            payment_status  = excluded.payment_status,
            status          = excluded.status,
            subscription    = excluded.subscription,
            amount_subtotal = excluded.amount_subtotal,
            amount_total    = excluded.amount_total,
            currency        = excluded.currency,
            success_url     = excluded.success_url,
            cancel_url      = excluded.cancel_url,
            metadata        = excluded.metadata,
            raw             = excluded.raw,
            last_synced_at  = now(),
            updated_at      = now()
        "#
    ))
    .bind(&cs.id)
    .bind(ctx.account_id)
    .bind(ts(cs.created))
    .bind(&customer)
    .bind(&cs.customer_email)
    .bind(&cs.mode)
    .bind(exp_id(&cs.payment_intent))
    .bind(&cs.payment_status)
    .bind(&cs.status)
    .bind(exp_id(&cs.subscription))
    .bind(cs.amount_subtotal)
    .bind(cs.amount_total)
    .bind(&cs.currency)
    .bind(&cs.success_url)
    .bind(&cs.cancel_url)
    .bind(&cs.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
