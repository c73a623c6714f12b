//! Connection pool management.
//!
//! A bounded pool of driver connections. One semaphore permit is held per lease,
//! so at most `max_connections` connections are ever in use; idle connections
//! wait in a queue for reuse. A lease that is dropped without being released
//! (panic, cancelled future) discards its connection but still frees its slot.

use crate::config::PoolConfig;
use crate::db::driver::{Connection, Connector};
use crate::error::{DbError, DbResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

const LEASE_TAKEN: &str = "BUG: pooled connection already released";

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting in the idle queue
    pub idle: usize,
    /// Connections currently leased
    pub in_use: usize,
    pub max: usize,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    idle: Mutex<VecDeque<C::Connection>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
}

/// A bounded, shareable pool of connections. Cloning yields another handle to the same pool.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("available", &self.inner.semaphore.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool and eagerly open `min_cached` connections.
    ///
    /// Any failure here is reported as [`DbError::Configuration`] carrying the
    /// driver error, and connections opened so far are closed again.
    pub async fn open(connector: C, config: PoolConfig) -> DbResult<Self> {
        config.validate()?;

        let mut idle = VecDeque::with_capacity(config.max_connections as usize);
        for _ in 0..config.min_cached {
            match connector.connect(&config).await {
                Ok(conn) => idle.push_back(conn),
                Err(e) => {
                    for conn in idle.drain(..) {
                        if let Err(close_err) = conn.close().await {
                            debug!(error = %close_err, "Failed to close connection after pool setup error");
                        }
                    }
                    return Err(DbError::configuration_caused_by(
                        format!("Could not establish pool for {}", config.masked_url()),
                        e,
                    ));
                }
            }
        }

        info!(
            target_db = %config.masked_url(),
            min_cached = config.min_cached,
            max_connections = config.max_connections,
            blocking = config.blocking,
            "Connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
                config,
                idle: Mutex::new(idle),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Lease a connection.
    ///
    /// At capacity this waits for a release when blocking is enabled (bounded by
    /// `acquire_timeout` if set), and fails with [`DbError::PoolExhausted`] otherwise.
    pub async fn acquire(&self) -> DbResult<PooledConnection<C>> {
        let permit = self.acquire_permit().await?;

        let reused = self.inner.idle.lock().await.pop_front();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("No idle connection, opening a new one");
                self.inner.connector.connect(&self.inner.config).await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    async fn acquire_permit(&self) -> DbResult<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(&self.inner.semaphore);
        let config = &self.inner.config;

        if !config.blocking {
            return semaphore.try_acquire_owned().map_err(|e| match e {
                TryAcquireError::NoPermits => DbError::pool_exhausted(config.max_connections),
                TryAcquireError::Closed => DbError::PoolClosed,
            });
        }

        match config.acquire_timeout {
            None => semaphore
                .acquire_owned()
                .await
                .map_err(|_| DbError::PoolClosed),
            Some(limit) => match tokio::time::timeout(limit, semaphore.acquire_owned()).await {
                Ok(permit) => permit.map_err(|_| DbError::PoolClosed),
                Err(_) => Err(DbError::timeout(
                    "connection pool acquire",
                    whole_secs_ceil(limit),
                )),
            },
        }
    }

    /// Close the pool: pending and future acquires fail with [`DbError::PoolClosed`],
    /// idle connections are closed, and outstanding leases are closed when released.
    pub async fn close(&self) {
        let drained: Vec<C::Connection> = {
            let mut idle = self.inner.idle.lock().await;
            self.inner.closed.store(true, Ordering::Release);
            self.inner.semaphore.close();
            idle.drain(..).collect()
        };

        for conn in drained {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close idle connection during pool shutdown");
            }
        }
        info!(target_db = %self.inner.config.masked_url(), "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> PoolStatus {
        let max = self.inner.config.max_connections as usize;
        let idle = self.inner.idle.lock().await.len();
        let in_use = max.saturating_sub(self.inner.semaphore.available_permits());
        PoolStatus { idle, in_use, max }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same underlying pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Seconds in `d`, rounded up and saturated at `u32::MAX`.
fn whole_secs_ceil(d: Duration) -> u32 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// A leased connection.
///
/// Call [`PooledConnection::release`] to hand it back for reuse. Dropping it
/// instead discards the connection; the slot is freed either way.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    pool: Arc<PoolInner<C>>,
    // Held until the lease is gone
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("released", &self.conn.is_none())
            .finish()
    }
}

impl<C: Connector> PooledConnection<C> {
    pub fn connection(&mut self) -> &mut C::Connection {
        self.conn.as_mut().expect(LEASE_TAKEN)
    }

    /// Reset the connection and return it to the idle queue.
    ///
    /// If the reset fails the connection is closed instead and the reset error is
    /// returned. The slot is freed in every case.
    pub async fn release(mut self) -> DbResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        if let Err(e) = conn.reset().await {
            if let Err(close_err) = conn.close().await {
                debug!(error = %close_err, "Failed to close connection after reset error");
            }
            return Err(e);
        }

        // Push before the permit is dropped so the next lease reuses this connection.
        let rejected = {
            let mut idle = self.pool.idle.lock().await;
            if self.pool.closed.load(Ordering::Acquire) {
                Some(conn)
            } else {
                idle.push_back(conn);
                None
            }
        };

        match rejected {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!("Lease dropped without release, discarding connection");
        }
    }
}
