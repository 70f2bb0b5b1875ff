//! Projectors for subscription and invoicing kinds. Subscriptions and
//! invoices carry embedded collections; their rows ride in the parent's
//! transaction so a partially-applied event can never leave dangling lines.

use serde_json::Value;
use sqlx::{Postgres, Transaction};
use ssync_stripe::types::{
    CreditNote, Invoice, InvoiceLineItem, Subscription, SubscriptionItem, SubscriptionSchedule,
    TaxIdObj,
};
use ssync_stripe::ObjectKind;

use crate::error::SyncError;
use crate::objects::table_name;

use super::{ensure_stub, exp_id, parse, ts, ProjectCtx};

pub(super) async fn upsert_subscription(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let s: Subscription = parse(ObjectKind::Subscription, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Subscription));
    let customer = exp_id(&s.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, status, currency,
            collection_method, cancel_at, canceled_at, cancel_at_period_end,
            current_period_start, current_period_end, default_payment_method,
            latest_invoice, trial_start, trial_end, metadata, raw
        ) values ($1, $2, 'subscription', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        on conflict (account_id, id) do update set
            object                 = excluded.object,
            created                = coalesce(t.created, excluded.created),
            customer               = excluded.customer,
            status                 = excluded.status,
            currency               = excluded.currency,
            collection_method      = excluded.collection_method,
            cancel_at              = excluded.cancel_at,
            canceled_at            = excluded.canceled_at,
            cancel_at_period_end   = excluded.cancel_at_period_end,
            current_period_start   = excluded.current_period_start,
            current_period_end     = excluded.current_period_end,
            default_payment_method = excluded.default_payment_method,
            latest_invoice         = excluded.latest_invoice,
            trial_start            = excluded.trial_start,
            trial_end              = excluded.trial_end,
            metadata               = excluded.metadata,
            raw                    = excluded.raw,
            last_synced_at         = now(),
            updated_at             = now()
        "#
    ))
    .bind(&s.id)
    .bind(ctx.account_id)
    .bind(ts(s.created))
    .bind(&customer)
    .bind(&s.status)
    .bind(&s.currency)
    .bind(&s.collection_method)
    .bind(ts(s.cancel_at))
    .bind(ts(s.canceled_at))
    .bind(s.cancel_at_period_end)
    .bind(ts(s.current_period_start))
    .bind(ts(s.current_period_end))
    .bind(exp_id(&s.default_payment_method))
    .bind(exp_id(&s.latest_invoice))
    .bind(ts(s.trial_start))
    .bind(ts(s.trial_end))
    .bind(&s.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;

    if ctx.auto_expand {
        if let Some(items) = &s.items {
            for item_raw in &items.data {
                upsert_subscription_item(&mut tx, ctx, &s.id, item_raw).await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_subscription_item(
    tx: &mut Transaction<'static, Postgres>,
    ctx: &ProjectCtx<'_>,
    subscription_id: &str,
    raw: &Value,
) -> Result<(), SyncError> {
    let item: SubscriptionItem = parse(ObjectKind::Subscription, raw)?;
    let table = ctx.db.table("subscription_items");

    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, subscription, price, quantity,
            metadata, raw
        ) values ($1, $2, 'subscription_item', $3, $4, $5, $6, $7, $8)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            subscription   = excluded.subscription,
            price          = excluded.price,
            quantity       = excluded.quantity,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&item.id)
    .bind(ctx.account_id)
    .bind(ts(item.created))
    .bind(item.subscription.as_deref().unwrap_or(subscription_id))
    .bind(&item.price)
    .bind(item.quantity)
    .bind(&item.metadata)
    .bind(raw)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(super) async fn upsert_subscription_schedule(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let s: SubscriptionSchedule = parse(ObjectKind::SubscriptionSchedule, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::SubscriptionSchedule));
    let customer = exp_id(&s.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, status, subscription,
            current_phase, phases, completed_at, canceled_at, metadata, raw
        ) values ($1, $2, 'subscription_schedule', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            customer       = excluded.customer,
            status         = excluded.status,
            subscription   = excluded.subscription,
            current_phase  = excluded.current_phase,
            phases         = excluded.phases,
            completed_at   = excluded.completed_at,
            canceled_at    = excluded.canceled_at,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&s.id)
    .bind(ctx.account_id)
    .bind(ts(s.created))
    .bind(&customer)
    .bind(&s.status)
    .bind(exp_id(&s.subscription))
    .bind(&s.current_phase)
    .bind(&s.phases)
    .bind(ts(s.completed_at))
    .bind(ts(s.canceled_at))
    .bind(&s.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_invoice(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let inv: Invoice = parse(ObjectKind::Invoice, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Invoice));
    let customer = exp_id(&inv.customer);
    let subscription = exp_id(&inv.subscription);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    if let Some(subscription) = &subscription {
        ensure_stub(
            &mut tx,
            ctx.db,
            ObjectKind::Subscription,
            ctx.account_id,
            subscription,
        )
        .await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, subscription, charge,
            payment_intent, status, billing_reason, collection_method,
            currency, amount_due, amount_paid, amount_remaining, subtotal,
            total, number, hosted_invoice_url, due_date, period_start,
            period_end, metadata, raw, deleted
        ) values ($1, $2, 'invoice', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
        on conflict (account_id, id) do update set
            object             = excluded.object,
            created            = coalesce(t.created, excluded.created),
            customer           = excluded.customer,
            subscription       = excluded.subscription,
            charge             = excluded.charge,
            payment_intent     = excluded.payment_intent,
            status             = excluded.status,
            billing_reason     = excluded.billing_reason,
            collection_method  = excluded.collection_method,
            currency           = excluded.currency,
            amount_due         = excluded.amount_due,
            amount_paid        = excluded.amount_paid,
            amount_remaining   = excluded.amount_remaining,
            subtotal           = excluded.subtotal,
            total              = excluded.total,
            number             = excluded.number,
            hosted_invoice_url = excluded.hosted_invoice_url,
            due_date           = excluded.due_date,
            period_start       = excluded.period_start,
            period_end         = excluded.period_end,
            metadata           = excluded.metadata,
            raw                = excluded.raw,
            deleted            = excluded.deleted,
            last_synced_at     = now(),
            updated_at         = now()
        "#
    ))
    .bind(&inv.id)
    .bind(ctx.account_id)
    .bind(ts(inv.created))
    .bind(&customer)
    .bind(&subscription)
    .bind(exp_id(&inv.charge))
    .bind(exp_id(&inv.payment_intent))
    .bind(&inv.status)
    .bind(&inv.billing_reason)
    .bind(&inv.collection_method)
    .bind(&inv.currency)
    .bind(inv.amount_due)
    .bind(inv.amount_paid)
    .bind(inv.amount_remaining)
    .bind(inv.subtotal)
    .bind(inv.total)
    .bind(&inv.number)
    .bind(&inv.hosted_invoice_url)
    .bind(ts(inv.due_date))
    .bind(ts(inv.period_start))
    .bind(ts(inv.period_end))
    .bind(&inv.metadata)
    .bind(raw)
    .bind(inv.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;

    if ctx.auto_expand {
        if let Some(lines) = &inv.lines {
            for line_raw in &lines.data {
                upsert_invoice_line(&mut tx, ctx, &inv.id, line_raw).await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_invoice_line(
    tx: &mut Transaction<'static, Postgres>,
    ctx: &ProjectCtx<'_>,
    invoice_id: &str,
    raw: &Value,
) -> Result<(), SyncError> {
    let line: InvoiceLineItem = parse(ObjectKind::Invoice, raw)?;
    let table = ctx.db.table("invoice_line_items");

    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, invoice, type, amount, currency,
            description, period, price, proration, quantity, subscription,
            subscription_item, metadata, raw
        ) values ($1, $2, 'line_item', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        on conflict (account_id, id) do update set
            object            = excluded.object,
            invoice           = excluded.invoice,
            type              = excluded.type,
            amount            = excluded.amount,
            currency          = excluded.currency,
            description       = excluded.description,
            period            = excluded.period,
            price             = excluded.price,
            proration         = excluded.proration,
            quantity          = excluded.quantity,
            subscription      = excluded.subscription,
            subscription_item = excluded.subscription_item,
            metadata          = excluded.metadata,
            raw               = excluded.raw,
            last_synced_at    = now(),
            updated_at        = now()
        "#
    ))
    .bind(&line.id)
    .bind(ctx.account_id)
    .bind(line.invoice.as_deref().unwrap_or(invoice_id))
    .bind(&line.line_type)
    .bind(line.amount)
    .bind(&line.currency)
    .bind(&line.description)
    .bind(&line.period)
    .bind(&line.price)
    .bind(line.proration)
    .bind(line.quantity)
    .bind(exp_id(&line.subscription))
    .bind(&line.subscription_item)
    .bind(&line.metadata)
    .bind(raw)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(super) async fn upsert_credit_note(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let cn: CreditNote = parse(ObjectKind::CreditNote, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::CreditNote));
    let customer = exp_id(&cn.customer);
    let invoice = exp_id(&cn.invoice);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    if let Some(invoice) = &invoice {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Invoice, ctx.account_id, invoice).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, invoice, amount,
            currency, memo, number, reason, refund, status, type, total,
            voided_at, metadata, raw
        ) values ($1, $2, 'credit_note', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            customer       = excluded.customer,
            invoice        = excluded.invoice,
            amount         = excluded.amount,
            currency       = excluded.currency,
            memo           = excluded.memo,
            number         = excluded.number,
            reason         = excluded.reason,
            refund         = excluded.refund,
            status         = excluded.status,
            type           = excluded.type,
            total          = excluded.total,
            voided_at      = excluded.voided_at,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&cn.id)
    .bind(ctx.account_id)
    .bind(ts(cn.created))
    .bind(&customer)
    .bind(&invoice)
    .bind(cn.amount)
    .bind(&cn.currency)
    .bind(&cn.memo)
    .bind(&cn.number)
    .bind(&cn.reason)
    .bind(exp_id(&cn.refund))
    .bind(&cn.status)
    .bind(&cn.note_type)
    .bind(cn.total)
    .bind(ts(cn.voided_at))
    .bind(&cn.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_tax_id(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let t: TaxIdObj = parse(ObjectKind::TaxId, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::TaxId));
    let customer = exp_id(&t.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, country, type, value,
            verification, metadata, raw, deleted
        ) values ($1, $2, 'tax_id', $3, $4, $5, $6, $7, $8, $9, $10, $11)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            customer       = excluded.customer,
            country        = excluded.country,
            type           = excluded.type,
            value          = excluded.value,
            verification   = excluded.verification,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            deleted        = excluded.deleted,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&t.id)
    .bind(ctx.account_id)
    .bind(ts(t.created))
    .bind(&customer)
    .bind(&t.country)
    .bind(&t.id_type)
    .bind(&t.value)
    .bind(&t.verification)
    .bind(&t.metadata)
    .bind(raw)
    .bind(t.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
