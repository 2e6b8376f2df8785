//! Connection management
//!
//! With pooling enabled every acquisition borrows from a lazily-connected
//! `PgPool` and releasing returns the connection to the pool. With pooling
//! disabled every acquisition opens a dedicated connection that is closed on
//! release.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres};
use tracing::{debug, info, instrument};

use crate::config::{DatabaseConfig, PoolingConfig};
use crate::error::{HarnessError, Result};
use crate::stress::{ProbeSession, SessionIdentity, SessionSource};

const SESSION_IDENTITY_SQL: &str =
    "SELECT pid, backend_start FROM pg_stat_activity WHERE pid = pg_backend_pid()";

/// Database client shared by the benchmark and stress phases
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: Option<PgPool>,
    options: PgConnectOptions,
    connect_timeout: Duration,
    target: String,
}

impl Database {
    /// Build the client from configuration
    ///
    /// The pool connects lazily, so an unreachable server shows up as
    /// per-operation errors rather than a startup failure.
    pub fn connect(database: &DatabaseConfig, pooling: &PoolingConfig) -> Result<Self> {
        let options = database.connect_options()?;
        let target = database.redacted_url();

        let pool = pooling.enabled.then(|| {
            PgPoolOptions::new()
                .min_connections(pooling.min_pool_size)
                .max_connections(pooling.max_pool_size)
                .acquire_timeout(pooling.connection_timeout)
                .idle_timeout(pooling.idle_timeout)
                .test_before_acquire(pooling.validate_connection)
                .connect_lazy_with(options.clone())
        });

        info!(
            database = %target,
            pooling = pooling.enabled,
            min_pool_size = pooling.min_pool_size,
            max_pool_size = pooling.max_pool_size,
            connection_timeout_secs = pooling.connection_timeout.as_secs(),
            validate_connection = pooling.validate_connection,
            "Database client configured"
        );
        debug!(
            incr_pool_size = pooling.incr_pool_size,
            decr_pool_size = pooling.decr_pool_size,
            enlist = pooling.enlist,
            "Pool growth and enlistment settings are not used by sqlx"
        );

        Ok(Self {
            pool,
            options,
            connect_timeout: pooling.connection_timeout,
            target,
        })
    }

    /// Whether connections come from a pool
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Redacted connection target
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Borrow a pooled connection or open a dedicated one
    pub async fn acquire(&self) -> Result<DbConnection> {
        match &self.pool {
            Some(pool) => Ok(DbConnection::Pooled(pool.acquire().await?)),
            None => {
                let conn = tokio::time::timeout(
                    self.connect_timeout,
                    PgConnection::connect_with(&self.options),
                )
                .await
                .map_err(|_| HarnessError::Timeout {
                    operation: "connect",
                    limit: self.connect_timeout,
                })??;
                Ok(DbConnection::Direct(conn))
            }
        }
    }

    /// Execute a statement on a fresh connection using the simple query protocol
    #[instrument(skip(self, sql))]
    pub async fn execute_sql(&self, sql: &str) -> Result<u64> {
        let mut conn = self.acquire().await?;
        let result = sqlx::raw_sql(sql).execute(&mut *conn).await;
        conn.release().await?;
        Ok(result?.rows_affected())
    }

    /// Close the pool, waiting for borrowed connections to come back
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            debug!("Connection pool closed");
        }
    }
}

/// A connection borrowed from [`Database`]
pub enum DbConnection {
    Pooled(PoolConnection<Postgres>),
    Direct(PgConnection),
}

impl Deref for DbConnection {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Self::Pooled(conn) => &**conn,
            Self::Direct(conn) => conn,
        }
    }
}

impl DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Direct(conn) => conn,
        }
    }
}

impl DbConnection {
    /// Return to the pool, or close a dedicated connection
    pub async fn release(self) -> Result<()> {
        match self {
            Self::Pooled(conn) => drop(conn),
            Self::Direct(conn) => conn.close().await?,
        }
        Ok(())
    }

    /// Backend process id and start time of this session, if visible
    pub async fn session_identity(&mut self) -> Result<Option<SessionIdentity>> {
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(SESSION_IDENTITY_SQL)
            .fetch_optional(&mut **self)
            .await?;

        Ok(row.map(|(pid, backend_start)| SessionIdentity { pid, backend_start }))
    }
}

#[async_trait]
impl ProbeSession for DbConnection {
    async fn identity(&mut self) -> Result<Option<SessionIdentity>> {
        self.session_identity().await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        (*self).release().await
    }
}

#[async_trait]
impl SessionSource for Database {
    async fn open(&self) -> Result<Box<dyn ProbeSession>> {
        Ok(Box::new(self.acquire().await?))
    }
}
