//! Administrative account deletion. The one operation that physically
//! removes rows; everything else in the engine only upserts.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::SyncEngine;

#[derive(Debug, Clone, Copy)]
pub struct DeleteAccountOptions {
    /// Count what would be deleted without deleting.
    pub dry_run: bool,
    /// All-or-nothing: run every delete in one transaction.
    pub use_transaction: bool,
}

impl Default for DeleteAccountOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_transaction: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub account_id: String,
    pub dry_run: bool,
    pub deleted_rows: BTreeMap<&'static str, u64>,
}

/// Children before parents, so foreign keys never block a delete.
const DELETE_ORDER: &[&str] = &[
    "_managed_webhooks",
    "_sync_obj_run",
    "_sync_run",
    "_sync_status",
    "early_fraud_warnings",
    "disputes",
    "refunds",
    "invoice_line_items",
    "credit_notes",
    "checkout_sessions",
    "setup_intents",
    "payment_intents",
    "charges",
    "invoices",
    "subscription_items",
    "subscription_schedules",
    "subscriptions",
    "payment_methods",
    "tax_ids",
    "customers",
    "prices",
    "plans",
    "products",
    "accounts",
];

impl SyncEngine {
    /// Remove every row belonging to `account_id`: mirror rows, cursors,
    /// runs, managed-webhook records, and finally the account row itself.
    ///
    /// Provider-side webhook endpoints are not touched; use
    /// [`SyncEngine::delete_managed_webhook`] first if those should go too.
    pub async fn dangerously_delete_account(
        &self,
        account_id: &str,
        opts: &DeleteAccountOptions,
    ) -> Result<DeleteReport, SyncError> {
        let mut deleted_rows = BTreeMap::new();

        if opts.dry_run {
            for table in DELETE_ORDER {
                let count = self.count_account_rows(table, account_id).await?;
                deleted_rows.insert(*table, count);
            }
            return Ok(DeleteReport {
                account_id: account_id.to_string(),
                dry_run: true,
                deleted_rows,
            });
        }

        if opts.use_transaction {
            let mut tx = self.db().begin().await?;
            for table in DELETE_ORDER {
                let sql = self.delete_sql(table);
                let affected = sqlx::query(&sql)
                    .bind(account_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(SyncError::from)?
                    .rows_affected();
                deleted_rows.insert(*table, affected);
            }
            tx.commit().await.map_err(SyncError::from)?;
        } else {
            warn!(account = %account_id, "deleting account without a transaction");
            for table in DELETE_ORDER {
                let sql = self.delete_sql(table);
                let affected = sqlx::query(&sql)
                    .bind(account_id)
                    .execute(self.db().pool())
                    .await
                    .map_err(SyncError::from)?
                    .rows_affected();
                deleted_rows.insert(*table, affected);
            }
        }

        info!(
            account = %account_id,
            total = deleted_rows.values().sum::<u64>(),
            "account purged"
        );
        Ok(DeleteReport {
            account_id: account_id.to_string(),
            dry_run: false,
            deleted_rows,
        })
    }

    fn delete_sql(&self, table: &str) -> String {
        let qualified = self.db().table(table);
        match table {
            // Sub-runs key on run_id, not account_id.
            "_sync_obj_run" => {
                let runs = self.db().table("_sync_run");
                format!(
                    "delete from {qualified} where run_id in (select id from {runs} where account_id = $1)"
                )
            }
            "accounts" => format!("delete from {qualified} where id = $1"),
            _ => format!("delete from {qualified} where account_id = $1"),
        }
    }

    async fn count_account_rows(&self, table: &str, account_id: &str) -> Result<u64, SyncError> {
        let qualified = self.db().table(table);
        let sql = match table {
            "_sync_obj_run" => {
                let runs = self.db().table("_sync_run");
                format!(
                    "select count(*) as n from {qualified} where run_id in (select id from {runs} where account_id = $1)"
                )
            }
            "accounts" => format!("select count(*) as n from {qualified} where id = $1"),
            _ => format!("select count(*) as n from {qualified} where account_id = $1"),
        };
        let row = sqlx::query(&sql)
            .bind(account_id)
            .fetch_one(self.db().pool())
            .await
            .map_err(SyncError::from)?;
        let n: i64 = row.try_get("n").map_err(ssync_db::DbError::from)?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{parent_kinds, table_name};
    use ssync_stripe::ALL_KINDS;

    #[test]
    fn delete_order_covers_every_mirror_table() {
        for kind in ALL_KINDS {
            assert!(
                DELETE_ORDER.contains(&table_name(*kind)),
                "{kind} missing from delete order"
            );
        }
        for infra in ["_sync_status", "_sync_run", "_sync_obj_run", "_managed_webhooks", "accounts"] {
            assert!(DELETE_ORDER.contains(&infra));
        }
    }

    #[test]
    fn children_are_deleted_before_their_parents() {
        let pos = |t: &str| DELETE_ORDER.iter().position(|x| *x == t).unwrap();
        for kind in ALL_KINDS {
            for parent in parent_kinds(*kind) {
                assert!(
                    pos(table_name(*kind)) < pos(table_name(*parent)),
                    "{kind} must be deleted before {parent}"
                );
            }
        }
        assert!(pos("invoice_line_items") < pos("invoices"));
        assert!(pos("subscription_items") < pos("subscriptions"));
        assert!(pos("accounts") == DELETE_ORDER.len() - 1);
    }
}
