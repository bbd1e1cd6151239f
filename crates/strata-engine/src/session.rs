//! A pooled connection bound to one request.
//!
//! Every statement runs under the request's timeout. A session that times
//! out, hits a driver error, or is dropped inside a transaction poisons its
//! connection so the pool discards it rather than reusing it.

use crate::pool::PooledConnection;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{ResultSet, SqlDialect, StrataError, StrataResult};
use tracing::{debug, warn};

pub struct Session {
    conn: PooledConnection,
    dialect: Arc<dyn SqlDialect>,
    in_txn: bool,
    timeout: Duration,
}

impl Session {
    pub fn new(conn: PooledConnection, dialect: Arc<dyn SqlDialect>, timeout: Duration) -> Self {
        Self {
            conn,
            dialect,
            in_txn: false,
            timeout,
        }
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn in_transaction(&self) -> bool {
        self.in_txn
    }

    pub async fn begin(&mut self) -> StrataResult<()> {
        if self.in_txn {
            return Err(StrataError::invalid("transaction already open on this connection"));
        }
        let statement = self.dialect.begin_statement();
        self.batch(statement, 0).await?;
        self.in_txn = true;
        debug!("Transaction opened");
        Ok(())
    }

    /// Commit; a failed commit is rolled back and reported against `document`
    pub async fn commit(&mut self, document: usize) -> StrataResult<()> {
        if !self.in_txn {
            return Ok(());
        }
        let statement = self.dialect.commit_statement();
        match self.batch(statement, document).await {
            Ok(()) => {
                self.in_txn = false;
                debug!("Transaction committed");
                Ok(())
            }
            Err(e) => {
                let _ = self.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn rollback(&mut self) -> StrataResult<()> {
        if !self.in_txn {
            return Ok(());
        }
        self.in_txn = false;
        let statement = self.dialect.rollback_statement();
        let result = self.batch(statement, 0).await;
        match &result {
            Ok(()) => debug!("Transaction rolled back"),
            Err(e) => {
                warn!(error = %e, "Rollback failed");
                self.conn.mark_broken();
            }
        }
        result
    }

    pub async fn query(&mut self, sql: &str, params: &[Value], document: usize) -> StrataResult<ResultSet> {
        debug!(sql, params = params.len(), "Running query");
        let timeout = self.timeout;
        let conn = self.conn.connection()?;
        let outcome = tokio::time::timeout(timeout, conn.query(sql, params)).await;
        self.settle(outcome, document)
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value], document: usize) -> StrataResult<ResultSet> {
        debug!(sql, params = params.len(), "Running statement");
        let timeout = self.timeout;
        let conn = self.conn.connection()?;
        let outcome = tokio::time::timeout(timeout, conn.execute(sql, params)).await;
        self.settle(outcome, document)
    }

    async fn batch(&mut self, sql: &str, document: usize) -> StrataResult<()> {
        let timeout = self.timeout;
        let conn = self.conn.connection()?;
        let outcome = tokio::time::timeout(timeout, conn.batch(sql)).await;
        self.settle(outcome, document)
    }

    fn settle<T>(
        &mut self,
        outcome: Result<crate::error::DriverResult<T>, tokio::time::error::Elapsed>,
        document: usize,
    ) -> StrataResult<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.conn.mark_broken();
                Err(e.into_strata(document))
            }
            Err(_) => {
                self.conn.mark_broken();
                Err(StrataError::QueryTimeout(self.timeout))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_txn {
            warn!("Session dropped with an open transaction; discarding connection");
            self.conn.mark_broken();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Connection, Driver};
    use crate::error::DriverResult;
    use crate::pool::Pool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_config::PoolConfig;
    use strata_core::dialect::Sqlite;

    /// Connections whose queries outlive any sane timeout
    #[derive(Debug, Default)]
    struct SlowDriver {
        opened: AtomicUsize,
    }

    struct SlowConnection;

    #[async_trait]
    impl Connection for SlowConnection {
        async fn query(&mut self, _sql: &str, _params: &[Value]) -> DriverResult<ResultSet> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ResultSet::default())
        }

        async fn execute(&mut self, _sql: &str, _params: &[Value]) -> DriverResult<ResultSet> {
            Ok(ResultSet::default())
        }

        async fn batch(&mut self, _sql: &str) -> DriverResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Driver for SlowDriver {
        fn dialect(&self) -> &'static str {
            "sqlite"
        }

        async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SlowConnection))
        }
    }

    fn pool() -> (Pool, Arc<SlowDriver>) {
        let driver = Arc::new(SlowDriver::default());
        let config = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime_seconds: 60,
            acquire_timeout_seconds: 1,
        };
        (Pool::new(driver.clone(), &config), driver)
    }

    #[tokio::test]
    async fn test_slow_statement_times_out_and_discards_connection() {
        let (pool, driver) = pool();
        let timeout = Duration::from_millis(10);
        let mut session = Session::new(pool.acquire().await.unwrap(), Arc::new(Sqlite), timeout);

        let err = session.query("SELECT 1", &[], 1).await.unwrap_err();
        assert_eq!(err, StrataError::QueryTimeout(timeout));

        drop(session);
        assert_eq!(pool.idle_count(), 0);
        let _fresh = pool.acquire().await.unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fast_statement_keeps_connection() {
        let (pool, driver) = pool();
        let mut session = Session::new(pool.acquire().await.unwrap(), Arc::new(Sqlite), Duration::from_secs(1));
        session.execute("UPDATE t SET a = 1", &[], 1).await.unwrap();

        drop(session);
        assert_eq!(pool.idle_count(), 1);
        let _again = pool.acquire().await.unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
    }
}
