//! Projectors for catalog and customer kinds.

use serde_json::Value;
use ssync_stripe::types::{Customer, PaymentMethod, Plan, Price, Product};
use ssync_stripe::ObjectKind;

use crate::error::SyncError;
use crate::objects::table_name;

use super::{ensure_stub, exp_id, parse, ts, ProjectCtx};

pub(super) async fn upsert_product(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let p: Product = parse(ObjectKind::Product, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Product));

    let mut tx = ctx.db.begin().await?;
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, name, active, description,
            default_price, livemode, unit_label, url, metadata, raw, deleted
        ) values ($1, $2, 'product', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            name           = excluded.name,
            active         = excluded.active,
            description    = excluded.description,
            default_price  = excluded.default_price,
            livemode       = excluded.livemode,
            unit_label     = excluded.unit_label,
            url            = excluded.url,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            deleted        = excluded.deleted,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&p.id)
    .bind(ctx.account_id)
    .bind(ts(p.created))
    .bind(&p.name)
    .bind(p.active)
    .bind(&p.description)
    .bind(exp_id(&p.default_price))
    .bind(p.livemode)
    .bind(&p.unit_label)
    .bind(&p.url)
    .bind(&p.metadata)
    .bind(raw)
    .bind(p.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_price(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let p: Price = parse(ObjectKind::Price, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Price));
    let product = exp_id(&p.product);

    let mut tx = ctx.db.begin().await?;
    if let Some(product) = &product {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Product, ctx.account_id, product).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, active, billing_scheme, currency,
            product, lookup_key, nickname, recurring, tiers_mode, type,
            unit_amount, unit_amount_decimal, metadata, raw, deleted
        ) values ($1, $2, 'price', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        on conflict (account_id, id) do update set
            object              = excluded.object,
            created             = coalesce(t.created, excluded.created),
            active              = excluded.active,
            billing_scheme      = excluded.billing_scheme,
            currency            = excluded.currency,
            product             = excluded.product,
            lookup_key          = excluded.lookup_key,
            nickname            = excluded.nickname,
            recurring           = excluded.recurring,
            tiers_mode          = excluded.tiers_mode,
            type                = excluded.type,
            unit_amount         = excluded.unit_amount,
            unit_amount_decimal = excluded.unit_amount_decimal,
            metadata            = excluded.metadata,
            raw                 = excluded.raw,
            deleted             = excluded.deleted,
            last_synced_at      = now(),
            updated_at          = now()
        "#
    ))
    .bind(&p.id)
    .bind(ctx.account_id)
    .bind(ts(p.created))
    .bind(p.active)
    .bind(&p.billing_scheme)
    .bind(&p.currency)
    .bind(&product)
    .bind(&p.lookup_key)
    .bind(&p.nickname)
    .bind(&p.recurring)
    .bind(&p.tiers_mode)
    .bind(&p.price_type)
    .bind(p.unit_amount)
    .bind(&p.unit_amount_decimal)
    .bind(&p.metadata)
    .bind(raw)
    .bind(p.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_plan(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let p: Plan = parse(ObjectKind::Plan, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Plan));
    let product = exp_id(&p.product);

    let mut tx = ctx.db.begin().await?;
    if let Some(product) = &product {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Product, ctx.account_id, product).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, active, amount, currency,
            "interval", interval_count, nickname, product, usage_type,
            metadata, raw, deleted
        ) values ($1, $2, 'plan', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        on conflict (account_id, id) do update set
            object         = excluded.object,
            created        = coalesce(t.created, excluded.created),
            active         = excluded.active,
            amount         = excluded.amount,
            currency       = excluded.currency,
            "interval"     = excluded."interval",
            interval_count = excluded.interval_count,
            nickname       = excluded.nickname,
            product        = excluded.product,
            usage_type     = excluded.usage_type,
            metadata       = excluded.metadata,
            raw            = excluded.raw,
            deleted        = excluded.deleted,
            last_synced_at = now(),
            updated_at     = now()
        "#
    ))
    .bind(&p.id)
    .bind(ctx.account_id)
    .bind(ts(p.created))
    .bind(p.active)
    .bind(p.amount)
    .bind(&p.currency)
    .bind(&p.interval)
    .bind(p.interval_count.map(|v| v as i32))
    .bind(&p.nickname)
    .bind(&product)
    .bind(&p.usage_type)
    .bind(&p.metadata)
    .bind(raw)
    .bind(p.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub(super) async fn upsert_customer(ctx: &ProjectCtx<'_>, raw: &Value) -> Result<(), SyncError> {
    let c: Customer = parse(ObjectKind::Customer, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::Customer));

    let mut tx = ctx.db.begin().await?;
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, email, name, description, phone,
            address, balance, currency, delinquent, invoice_settings, shipping,
            tax_exempt, metadata, raw, deleted
        ) values ($1, $2, 'customer', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        on conflict (account_id, id) do update set
            object           = excluded.object,
            created          = coalesce(t.created, excluded.created),
            email            = excluded.email,
            name             = excluded.name,
            description      = excluded.description,
            phone            = excluded.phone,
            address          = excluded.address,
            balance          = excluded.balance,
            currency         = excluded.currency,
            delinquent       = excluded.delinquent,
            invoice_settings = excluded.invoice_settings,
            shipping         = excluded.shipping,
            tax_exempt       = excluded.tax_exempt,
            metadata         = excluded.metadata,
            raw              = excluded.raw,
            deleted          = excluded.deleted,
            last_synced_at   = now(),
            updated_at       = now()
        "#
    ))
    .bind(&c.id)
    .bind(ctx.account_id)
    .bind(ts(c.created))
    .bind(&c.email)
    .bind(&c.name)
    .bind(&c.description)
    .bind(&c.phone)
    .bind(&c.address)
    .bind(c.balance)
    .bind(&c.currency)
    .bind(c.delinquent)
    .bind(&c.invoice_settings)
    .bind(&c.shipping)
    .bind(&c.tax_exempt)
    .bind(&c.metadata)
    .bind(raw)
    .bind(c.deleted.unwrap_or(false))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    if ctx.auto_expand {
        expand_default_payment_method(ctx, &c).await?;
    }
    Ok(())
}

/// Single-hop expansion of `invoice_settings.default_payment_method`.
async fn expand_default_payment_method(
    ctx: &ProjectCtx<'_>,
    customer: &Customer,
) -> Result<(), SyncError> {
    let Some(dpm) = customer
        .invoice_settings
        .as_ref()
        .and_then(|v| v.get("default_payment_method"))
    else {
        return Ok(());
    };

    let inner = ctx.without_expand();
    match dpm {
        Value::String(pm_id) => {
            // Absent is fine: detached between event creation and now.
            if let Some(pm_raw) = ctx.client.retrieve(ObjectKind::PaymentMethod, pm_id).await? {
                upsert_payment_method(&inner, &pm_raw).await?;
            }
        }
        Value::Object(_) => upsert_payment_method(&inner, dpm).await?,
        _ => {}
    }
    Ok(())
}

pub(super) async fn upsert_payment_method(
    ctx: &ProjectCtx<'_>,
    raw: &Value,
) -> Result<(), SyncError> {
    let pm: PaymentMethod = parse(ObjectKind::PaymentMethod, raw)?;
    let table = ctx.db.table(table_name(ObjectKind::PaymentMethod));
    let customer = exp_id(&pm.customer);

    let mut tx = ctx.db.begin().await?;
    if let Some(customer) = &customer {
        ensure_stub(&mut tx, ctx.db, ObjectKind::Customer, ctx.account_id, customer).await?;
    }
    sqlx::query(&format!(
        r#"
        insert into {table} as t (
            id, account_id, object, created, customer, type, billing_details,
            card, livemode, metadata, raw
        ) values ($1, $2, 'payment_method', $3, $4, $5, $6, $7, $8, $9, $10)
        on conflict (account_id, id) do update set
            object          = excluded.object,
            created         = coalesce(t.created, excluded.created),
            customer        = excluded.customer,
            type            = excluded.type,
            billing_details = excluded.billing_details,
            card            = excluded.card,
            livemode        = excluded.livemode,
            metadata        = excluded.metadata,
            raw             = excluded.raw,
            last_synced_at  = now(),
            updated_at      = now()
        "#
    ))
    .bind(&pm.id)
    .bind(ctx.account_id)
    .bind(ts(pm.created))
    .bind(&customer)
    .bind(&pm.method_type)
    .bind(&pm.billing_details)
    .bind(&pm.card)
    .bind(pm.livemode)
    .bind(&pm.metadata)
    .bind(raw)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
