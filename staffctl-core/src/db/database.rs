//! Connection and transaction executor
//!
//! `Database` owns the pools and the frozen schema model. Writes go through
//! `run_in_transaction`, which gives each unit of work its own READ COMMITTED
//! transaction, bounds it by a timeout and retries it as a whole on transient
//! faults.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use super::pool;
use super::retry::{retry, RetryPolicy};
use super::schema::SchemaModel;
use super::DbError;
use crate::config::DatabaseConfig;

/// Default per-unit-of-work timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared handle to the database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    primary: PgPool,
    replica: Option<PgPool>,
    schema: Arc<SchemaModel>,
    retry: RetryPolicy,
    command_timeout: Duration,
}

impl Database {
    /// Wrap an existing pool with default retry and timeout settings.
    pub fn from_pool(primary: PgPool, schema: Arc<SchemaModel>) -> Self {
        Self {
            primary,
            replica: None,
            schema,
            retry: RetryPolicy::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Connect the primary (and the read replica when configured), retrying
    /// transient connection failures with the configured policy.
    pub async fn connect(config: &DatabaseConfig, schema: Arc<SchemaModel>) -> Result<Self, DbError> {
        let policy = config.retry_policy();

        let primary = retry(&policy, "connect primary database", move || async move {
            Ok(pool::create_pool_with_options(&config.primary_url, config.max_connections).await?)
        })
        .await?;
        info!("connected to primary database");

        let replica = match config.read_only_url() {
            Some(url) => {
                let replica = retry(&policy, "connect read replica", move || async move {
                    Ok(pool::create_pool_with_options(url, config.max_connections).await?)
                })
                .await?;
                info!("connected to read replica");
                Some(replica)
            }
            None => None,
        };

        Ok(Self {
            primary,
            replica,
            schema,
            retry: policy,
            command_timeout: config.command_timeout(),
        })
    }

    /// Build pools that connect on first use. Used where a handle is needed
    /// before the server is reachable.
    pub fn connect_lazy(config: &DatabaseConfig, schema: Arc<SchemaModel>) -> Result<Self, DbError> {
        let primary = pool::create_lazy_pool(&config.primary_url, config.max_connections)?;
        let replica = config
            .read_only_url()
            .map(|url| pool::create_lazy_pool(url, config.max_connections))
            .transpose()?;

        Ok(Self {
            primary,
            replica,
            schema,
            retry: config.retry_policy(),
            command_timeout: config.command_timeout(),
        })
    }

    pub fn with_replica(mut self, replica: PgPool) -> Self {
        self.replica = Some(replica);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Pool for writes and transactional reads.
    pub fn primary(&self) -> &PgPool {
        &self.primary
    }

    /// Pool for non-transactional reads: the replica when configured,
    /// otherwise the primary.
    pub fn reader(&self) -> &PgPool {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Run `work` in a transaction bounded by the configured command timeout.
    ///
    /// `work` may be called more than once: a transient failure rolls back
    /// the attempt and the whole unit of work is retried.
    ///
    /// ```ignore
    /// let staff = db
    ///     .run_in_transaction(move |conn| {
    ///         let (repo, staff) = (repo.clone(), staff.clone());
    ///         Box::pin(async move { repo.add(conn, staff).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, DbError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    {
        self.run_in_transaction_with_timeout(self.command_timeout, work)
            .await
    }

    /// Like `run_in_transaction` with an explicit timeout. A zero timeout
    /// disables the bound.
    pub async fn run_in_transaction_with_timeout<T, F>(
        &self,
        timeout: Duration,
        mut work: F,
    ) -> Result<T, DbError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = if timeout.is_zero() {
                self.attempt(timeout, &mut work).await
            } else {
                match tokio::time::timeout(timeout, self.attempt(timeout, &mut work)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DbError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                }
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let err = if timeout.is_zero() {
                        err
                    } else {
                        err.or_timeout(timeout.as_secs())
                    };
                    self.retry.backoff("transaction", attempt, err).await?
                }
            }
        }
    }

    /// One attempt. Dropping the transaction on any early return rolls it back.
    async fn attempt<T, F>(&self, timeout: Duration, work: &mut F) -> Result<T, DbError>
    where
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, DbError>>,
    {
        let mut tx = self.primary.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        if !timeout.is_zero() {
            let stmt = statement_timeout_sql(timeout);
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }

        let value = work(&mut *tx).await?;
        tx.commit().await?;
        Ok(value)
    }
}

/// `SET LOCAL` only lasts until the end of the current transaction.
pub(crate) fn statement_timeout_sql(timeout: Duration) -> String {
    format!("SET LOCAL statement_timeout = {}", timeout.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_db() -> Database {
        let pool = pool::create_lazy_pool("postgres://nobody@127.0.0.1:1/none", 1).unwrap();
        Database::from_pool(pool, Arc::new(SchemaModel::new()))
    }

    #[test]
    fn statement_timeout_in_millis() {
        assert_eq!(
            statement_timeout_sql(Duration::from_secs(600)),
            "SET LOCAL statement_timeout = 600000"
        );
    }

    #[tokio::test]
    async fn defaults() {
        let db = lazy_db();
        assert_eq!(db.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(db.retry_policy().max_retries, 10);
    }

    #[tokio::test]
    async fn reader_falls_back_to_primary() {
        let db = lazy_db();
        assert!(std::ptr::eq(db.reader(), db.primary()));

        let replica = pool::create_lazy_pool("postgres://nobody@127.0.0.1:2/none", 1).unwrap();
        let db = db.with_replica(replica);
        assert!(!std::ptr::eq(db.reader(), db.primary()));
    }

    async fn test_db() -> Database {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = pool::create_pool(&url).await.expect("pool creation failed");
        Database::from_pool(pool, Arc::new(SchemaModel::new()))
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn transaction_runs_read_committed() {
        let db = test_db().await;
        let level: String = db
            .run_in_transaction(|conn| {
                Box::pin(async move {
                    let (level,): (String,) = sqlx::query_as("SHOW transaction_isolation")
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok(level)
                })
            })
            .await
            .unwrap();
        assert_eq!(level, "read committed");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn slow_work_times_out() {
        let db = test_db().await;
        let result: Result<(), _> = db
            .run_in_transaction_with_timeout(Duration::from_secs(1), |conn| {
                Box::pin(async move {
                    sqlx::query("SELECT pg_sleep(5)").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .await;
        assert!(matches!(result, Err(DbError::Timeout { seconds: 1 })));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn failed_work_is_not_committed() {
        let db = test_db().await;
        sqlx::query("CREATE TABLE IF NOT EXISTS tx_rollback_check (id TEXT PRIMARY KEY)")
            .execute(db.primary())
            .await
            .unwrap();
        sqlx::query("DELETE FROM tx_rollback_check").execute(db.primary()).await.unwrap();

        let result: Result<(), _> = db
            .run_in_transaction(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO tx_rollback_check (id) VALUES ('a')")
                        .execute(&mut *conn)
                        .await?;
                    Err(DbError::Mapping("abort".into()))
                })
            })
            .await;
        assert!(matches!(result, Err(DbError::Mapping(_))));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tx_rollback_check")
            .fetch_one(db.primary())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
