//! Client lifecycle variants.
//!
//! - [`SingletonRegistry`]: one client and one pool for the whole process. The
//!   first successful construction wins and later arguments are ignored.
//! - [`DatabaseClient`]: one pool per construction, shareable across tasks.
//! - [`LocalDatabaseClient`]: one pool per construction, used by a single owner.

use crate::config::PoolConfig;
use crate::db::client::{DatabaseClient, Statement, execute_select, execute_write};
use crate::db::driver::Connector;
use crate::db::mysql::MySqlConnector;
use crate::db::pool::ConnectionPool;
use crate::error::DbResult;
use crate::models::{Fetch, QueryParam, Selection};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Process-wide MySQL client used by [`DatabaseClient::shared`].
static GLOBAL: SingletonRegistry<MySqlConnector> = SingletonRegistry::new();

/// Holds at most one client, created on first use.
///
/// Creation is double-checked: a lock-free read first, then a check-and-create
/// under the creation lock, so concurrent first callers build exactly one pool.
/// The lock is never held while queries run.
pub struct SingletonRegistry<C: Connector> {
    client: OnceLock<DatabaseClient<C>>,
    create_lock: Mutex<()>,
}

impl<C: Connector> SingletonRegistry<C> {
    pub const fn new() -> Self {
        Self {
            client: OnceLock::new(),
            create_lock: Mutex::const_new(()),
        }
    }

    /// The registered client, if one has been created.
    pub fn get(&self) -> Option<DatabaseClient<C>> {
        self.client.get().cloned()
    }

    /// Return the registered client, creating it from `connector` and `config`
    /// on first use.
    ///
    /// Once a client exists the arguments are ignored. A failed creation leaves
    /// the registry empty so that a later call can try again.
    pub async fn get_or_init(&self, connector: C, config: PoolConfig) -> DbResult<DatabaseClient<C>> {
        if let Some(client) = self.client.get() {
            debug!("Shared client already initialized, ignoring new settings");
            return Ok(client.clone());
        }

        let _guard = self.create_lock.lock().await;
        if let Some(client) = self.client.get() {
            debug!("Shared client initialized concurrently, ignoring new settings");
            return Ok(client.clone());
        }

        let client = DatabaseClient::with_connector(connector, config).await?;
        info!(target_db = %client.pool().config().masked_url(), "Shared client initialized");
        Ok(self.client.get_or_init(|| client).clone())
    }
}

impl<C: Connector> Default for SingletonRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseClient<MySqlConnector> {
    /// The process-wide client.
    ///
    /// The first call creates the pool from `config`; every later call returns
    /// the same client and ignores its argument.
    pub async fn shared(config: PoolConfig) -> DbResult<Self> {
        GLOBAL.get_or_init(MySqlConnector, config).await
    }
}

/// A client for a single owner.
///
/// Operations take `&mut self`, so at most one is in flight at a time. The
/// client may be moved to another thread but not shared between threads.
pub struct LocalDatabaseClient<C: Connector = MySqlConnector> {
    pool: ConnectionPool<C>,
    _not_sync: PhantomData<Cell<()>>,
}

impl LocalDatabaseClient<MySqlConnector> {
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> DbResult<Self> {
        Self::from_config(PoolConfig::new(host, port, user, password, database)).await
    }

    pub async fn from_config(config: PoolConfig) -> DbResult<Self> {
        Self::with_connector(MySqlConnector, config).await
    }
}

impl<C: Connector> LocalDatabaseClient<C> {
    pub async fn with_connector(connector: C, config: PoolConfig) -> DbResult<Self> {
        Ok(Self {
            pool: ConnectionPool::open(connector, config).await?,
            _not_sync: PhantomData,
        })
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub async fn execute_procedure(&mut self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        execute_write(&self.pool, Statement::Procedure { name, args }).await
    }

    pub async fn insert_by_procedure(&mut self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        self.execute_procedure(name, args).await
    }

    pub async fn update_by_procedure(&mut self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        self.execute_procedure(name, args).await
    }

    pub async fn select_procedure(
        &mut self,
        name: &str,
        fetch: Fetch,
        args: &[QueryParam],
    ) -> DbResult<Selection> {
        execute_select(&self.pool, Statement::Procedure { name, args }, fetch).await
    }

    pub async fn select_sql(&mut self, sql: &str, fetch: Fetch) -> DbResult<Selection> {
        execute_select(&self.pool, Statement::Sql(sql), fetch).await
    }

    pub async fn update_sql(&mut self, sql: &str) -> DbResult<()> {
        execute_write(&self.pool, Statement::Sql(sql)).await
    }
}
