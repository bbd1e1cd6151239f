//! Connection pool, one per data source.
//!
//! A semaphore bounds how many connections are checked out or being opened.
//! Returned connections go back on an idle queue unless they were marked
//! broken, outlived `max_lifetime`, or the queue already holds `max_idle`.

use crate::driver::{Connection, Driver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_config::PoolConfig;
use strata_core::{StrataError, StrataResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

struct IdleConnection {
    conn: Box<dyn Connection>,
    opened: Instant,
}

type IdleQueue = Arc<Mutex<VecDeque<IdleConnection>>>;

#[derive(Clone)]
pub struct Pool {
    driver: Arc<dyn Driver>,
    semaphore: Arc<Semaphore>,
    idle: IdleQueue,
    max_idle: usize,
    max_lifetime: Duration,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("driver", &self.driver)
            .field("available", &self.available())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl Pool {
    pub fn new(driver: Arc<dyn Driver>, config: &PoolConfig) -> Self {
        Self {
            driver,
            semaphore: Arc::new(Semaphore::new(config.max_open.max(1))),
            idle: Arc::new(Mutex::new(VecDeque::new())),
            max_idle: config.max_idle,
            max_lifetime: config.max_lifetime(),
            acquire_timeout: config.acquire_timeout(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Check out a connection, reusing an idle one when possible.
    ///
    /// Fails with `ConnectionUnavailable` when no slot frees up within the
    /// acquire timeout or the driver cannot connect.
    pub async fn acquire(&self) -> StrataResult<PooledConnection> {
        let started = Instant::now();
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            StrataError::ConnectionUnavailable(format!(
                "no {} connection available after {:?}",
                self.driver.dialect(),
                self.acquire_timeout
            ))
        })?
        .map_err(|e| StrataError::ConnectionUnavailable(e.to_string()))?;

        if let Some(idle) = self.take_idle() {
            debug!(dialect = self.driver.dialect(), "Reusing idle connection");
            return Ok(self.wrap(idle.conn, idle.opened, permit));
        }

        let remaining = self.acquire_timeout.saturating_sub(started.elapsed());
        let conn = tokio::time::timeout(remaining, self.driver.connect())
            .await
            .map_err(|_| {
                StrataError::ConnectionUnavailable(format!(
                    "timed out connecting to {}",
                    self.driver.dialect()
                ))
            })?
            .map_err(|e| StrataError::ConnectionUnavailable(e.to_string()))?;
        info!(dialect = self.driver.dialect(), "Opened new connection");

        Ok(self.wrap(conn, Instant::now(), permit))
    }

    fn take_idle(&self) -> Option<IdleConnection> {
        let mut idle = self.idle.lock();
        while let Some(candidate) = idle.pop_front() {
            if candidate.opened.elapsed() < self.max_lifetime {
                return Some(candidate);
            }
            debug!("Dropping expired idle connection");
        }
        None
    }

    fn wrap(
        &self,
        conn: Box<dyn Connection>,
        opened: Instant,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            opened,
            broken: false,
            idle: self.idle.clone(),
            max_idle: self.max_idle,
            max_lifetime: self.max_lifetime,
            _permit: permit,
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Free checkout slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A checked-out connection; returns itself to the pool on drop
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    opened: Instant,
    broken: bool,
    idle: IdleQueue,
    max_idle: usize,
    max_lifetime: Duration,
    // released after the connection is back on the idle queue
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("opened", &self.opened)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub fn connection(&mut self) -> StrataResult<&mut (dyn Connection + 'static)> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| StrataError::ConnectionUnavailable("connection already released".into()))
    }

    /// Discard the connection instead of reusing it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.broken || self.opened.elapsed() >= self.max_lifetime {
            debug!(broken = self.broken, "Closing connection");
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push_back(IdleConnection {
                conn,
                opened: self.opened,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverResult;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_core::ResultSet;

    #[derive(Debug, Default)]
    struct CountingDriver {
        opened: AtomicUsize,
    }

    struct NullConnection;

    #[async_trait]
    impl Connection for NullConnection {
        async fn query(&mut self, _sql: &str, _params: &[Value]) -> DriverResult<ResultSet> {
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
    impl Driver for CountingDriver {
        fn dialect(&self) -> &'static str {
            "sqlite"
        }

        async fn connect(&self) -> DriverResult<Box<dyn Connection>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullConnection))
        }
    }

    fn pool(max_open: usize, max_idle: usize) -> (Pool, Arc<CountingDriver>) {
        let driver = Arc::new(CountingDriver::default());
        let config = PoolConfig {
            max_open,
            max_idle,
            max_lifetime_seconds: 60,
            acquire_timeout_seconds: 1,
        };
        (Pool::new(driver.clone(), &config), driver)
    }

    #[tokio::test]
    async fn test_idle_connection_is_reused() {
        let (pool, driver) = pool(2, 1);
        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.idle_count(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_broken_connection_is_discarded() {
        let (pool, driver) = pool(2, 2);
        let mut conn = pool.acquire().await.unwrap();
        conn.mark_broken();
        drop(conn);
        assert_eq!(pool.idle_count(), 0);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(driver.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let (pool, _) = pool(1, 1);
        let _held = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, StrataError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_idle_queue_is_capped() {
        let (pool, _) = pool(3, 1);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.available(), 3);
    }
}
