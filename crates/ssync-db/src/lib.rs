//! Postgres adapter for the sync engine.
//!
//! Thin capability over a pooled connection: queries run through [`Db::pool`],
//! transactions through [`Db::begin`], cross-worker serialization through
//! [`Db::with_advisory_lock`]. All engine SQL is schema-qualified via
//! [`Db::table`] so one database can host several isolated deployments.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use ssync_config::PoolSettings;

mod error;
pub mod migrate;

pub use error::DbError;
pub use migrate::{migrations, run_migrations, Migration};

/// Shared handle to the pool plus the namespace every query targets.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
    schema: String,
}

impl Db {
    /// Connect a fresh pool from settings.
    pub async fn connect(settings: &PoolSettings, schema: &str) -> Result<Self, DbError> {
        let opts: PgConnectOptions = settings
            .connection_string
            .expose()
            .parse()
            .map_err(|e: sqlx::Error| DbError::connect(e.to_string()))?;

        let mut pool_opts = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(30));
        if settings.tcp_keepalive {
            // Keep pooled connections alive indefinitely; the provider mirror
            // is long-running and reconnect churn costs more than idle slots.
            pool_opts = pool_opts.idle_timeout(None).test_before_acquire(true);
        }

        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(|e| DbError::connect(e.to_string()))?;

        Ok(Self::from_pool(pool, schema))
    }

    /// Wrap an existing pool (callers that manage their own pool lifecycle).
    pub fn from_pool(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Schema-qualified, quoted table reference for interpolation into SQL.
    ///
    /// An empty schema yields the bare table name (search-path resolution).
    pub fn table(&self, name: &str) -> String {
        if self.schema.is_empty() {
            format!("\"{name}\"")
        } else {
            format!("\"{}\".\"{name}\"", self.schema)
        }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        self.pool.begin().await.map_err(DbError::from)
    }

    /// Run `f` while holding the session-level advisory lock `key`.
    ///
    /// The lock is taken on a dedicated connection and released on both the
    /// success and error path. Callers on other workers block until release,
    /// which is exactly what the managed-webhook lifecycle needs.
    pub async fn with_advisory_lock<T, E, F, Fut>(&self, key: i64, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        sqlx::query("select pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(DbError::from)?;

        let result = f().await;

        let unlocked: Result<(bool,), sqlx::Error> =
            sqlx::query_as("select pg_advisory_unlock($1)")
                .bind(key)
                .fetch_one(&mut *conn)
                .await;
        match unlocked {
            Ok((true,)) => {}
            Ok((false,)) => {
                tracing::warn!(key, "advisory unlock reported no lock held");
            }
            Err(e) => {
                // The session lock dies with the connection either way.
                tracing::warn!(key, error = %e, "advisory unlock failed");
            }
        }

        result
    }

    /// Like [`Db::with_advisory_lock`] but non-blocking: returns `Ok(None)`
    /// without running `f` when another session holds `key`.
    pub async fn with_try_advisory_lock<T, E, F, Fut>(
        &self,
        key: i64,
        f: F,
    ) -> Result<Option<T>, E>
    where
        E: From<DbError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let (acquired,): (bool,) = sqlx::query_as("select pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(DbError::from)?;
        if !acquired {
            return Ok(None);
        }

        let result = f().await;

        let unlocked: Result<(bool,), sqlx::Error> =
            sqlx::query_as("select pg_advisory_unlock($1)")
                .bind(key)
                .fetch_one(&mut *conn)
                .await;
        if let Err(e) = unlocked {
            tracing::warn!(key, error = %e, "advisory unlock failed");
        }

        result.map(Some)
    }

    /// Connectivity + namespace probe, used by the daemon health endpoint.
    pub async fn status(&self) -> Result<DbStatus, DbError> {
        let (one,): (i32,) = sqlx::query_as("select 1").fetch_one(&self.pool).await?;

        let (migrated,): (bool,) = sqlx::query_as(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema = $1 and table_name = '_migrations'
            )
            "#,
        )
        .bind(self.ledger_schema())
        .fetch_one(&self.pool)
        .await?;

        Ok(DbStatus {
            ok: one == 1,
            migrated,
        })
    }

    /// Schema name as it appears in `information_schema` lookups.
    fn ledger_schema(&self) -> &str {
        if self.schema.is_empty() {
            "public"
        } else {
            &self.schema
        }
    }

    /// Drain the pool. Idempotent; callers use this on graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub migrated: bool,
}
