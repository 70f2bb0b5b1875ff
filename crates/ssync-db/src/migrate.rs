//! Ordered, ledgered schema migrations.
//!
//! Migrations are embedded `NNNN_name.sql` files templated with `{{SCHEMA}}`.
//! Each file must be individually idempotent (`IF NOT EXISTS` style) so an
//! operator can re-run after a crash that interrupted the ledger commit.
//!
//! The ledger row is inserted in the same transaction that applies the
//! migration: a failed migration rolls back both, and a concurrent migrator
//! blocks on the uncommitted ledger insert instead of double-applying.

use sqlx::Executor;
use tracing::info;

use crate::{Db, DbError};

/// One (name, sql) pair. Names carry a numeric prefix imposing total order.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_accounts",
        sql: include_str!("../migrations/0001_accounts.sql"),
    },
    Migration {
        name: "0002_sync_infra",
        sql: include_str!("../migrations/0002_sync_infra.sql"),
    },
    Migration {
        name: "0003_core_objects",
        sql: include_str!("../migrations/0003_core_objects.sql"),
    },
    Migration {
        name: "0004_billing_objects",
        sql: include_str!("../migrations/0004_billing_objects.sql"),
    },
    Migration {
        name: "0005_payment_objects",
        sql: include_str!("../migrations/0005_payment_objects.sql"),
    },
    Migration {
        name: "0006_managed_webhooks",
        sql: include_str!("../migrations/0006_managed_webhooks.sql"),
    },
    Migration {
        name: "0007_sync_dashboard",
        sql: include_str!("../migrations/0007_sync_dashboard.sql"),
    },
];

/// The full ordered migration set.
pub fn migrations() -> &'static [Migration] {
    MIGRATIONS
}

/// Substitute the configured schema into a migration body.
///
/// Files reference tables as `"{{SCHEMA}}".name`; an empty schema strips the
/// qualifier entirely so tables land on the search path.
fn render(sql: &str, schema: &str) -> String {
    if schema.is_empty() {
        sql.replace("\"{{SCHEMA}}\".", "")
    } else {
        sql.replace("{{SCHEMA}}", schema)
    }
}

/// Apply every migration that is not yet in the ledger.
///
/// Fatal on first failure; the ledger stays unchanged for the failed file and
/// nothing after it is attempted.
pub async fn run_migrations(db: &Db) -> Result<(), DbError> {
    ensure_ledger(db).await?;

    let ledger = db.table("_migrations");
    for (i, m) in MIGRATIONS.iter().enumerate() {
        if i > 0 && MIGRATIONS[i - 1].name >= m.name {
            return Err(DbError::migration(m.name, "migration names out of order"));
        }

        let mut tx = db.begin().await?;

        let claimed = sqlx::query(&format!(
            "insert into {ledger} (name) values ($1) on conflict (name) do nothing"
        ))
        .bind(m.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::migration(m.name, e.to_string()))?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            continue;
        }

        let rendered = render(m.sql, db.schema());
        (&mut *tx)
            .execute(rendered.as_str())
            .await
            .map_err(|e| DbError::migration(m.name, e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DbError::migration(m.name, e.to_string()))?;
        info!(migration = m.name, "applied");
    }

    Ok(())
}

/// Create the namespace and ledger table. Safe to call repeatedly.
async fn ensure_ledger(db: &Db) -> Result<(), DbError> {
    if !db.schema().is_empty() {
        sqlx::query(&format!("create schema if not exists \"{}\"", db.schema()))
            .execute(db.pool())
            .await?;
    }

    let ledger = db.table("_migrations");
    sqlx::query(&format!(
        r#"
        create table if not exists {ledger} (
            name       text primary key,
            applied_at timestamptz not null default now()
        )
        "#
    ))
    .execute(db.pool())
    .await?;

    Ok(())
}
