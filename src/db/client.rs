//! Pooled database client.
//!
//! Every operation follows the same protocol:
//!
//! 1. lease a connection from the pool
//! 2. execute the statement or procedure, which opens a cursor
//! 3. commit (write operations only)
//! 4. on failure in 2 or 3, roll back on the same connection
//! 5. close the cursor, then release the connection
//!
//! Step 5 always runs once a connection has been leased, and is the only step
//! whose failures are swallowed (logged as warnings). Driver errors reach the
//! caller unchanged; a failed rollback is reported as [`DbError::Rollback`]
//! carrying both errors.

use crate::config::PoolConfig;
use crate::db::driver::{Connection, Connector, Cursor};
use crate::db::mysql::MySqlConnector;
use crate::db::pool::{ConnectionPool, PooledConnection};
use crate::db::record::collect_selection;
use crate::error::{DbError, DbResult};
use crate::models::{Fetch, QueryParam, Selection};
use tracing::{debug, error, trace, warn};

type CursorOf<C> = <<C as Connector>::Connection as Connection>::Cursor;

/// Protocol phase, for trace logging.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Acquiring,
    Executing,
    Committing,
    RollingBack,
    Releasing,
}

/// What to run once a connection is leased.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Statement<'a> {
    Procedure {
        name: &'a str,
        args: &'a [QueryParam],
    },
    Sql(&'a str),
}

impl Statement<'_> {
    /// Reject blank statements before a connection is leased.
    fn validate(&self) -> DbResult<()> {
        match *self {
            Statement::Procedure { name, .. } if name.trim().is_empty() => {
                Err(DbError::invalid_input("Procedure name must not be empty"))
            }
            Statement::Sql(sql) if sql.trim().is_empty() => {
                Err(DbError::invalid_input("SQL statement must not be empty"))
            }
            _ => Ok(()),
        }
    }

    async fn open<K: Connection>(&self, conn: &mut K) -> DbResult<K::Cursor> {
        match *self {
            // No arguments means the argument-less call form, never an empty list.
            Statement::Procedure { name, args } if args.is_empty() => {
                conn.call_procedure(name, None).await
            }
            Statement::Procedure { name, args } => conn.call_procedure(name, Some(args)).await,
            Statement::Sql(sql) => conn.execute(sql).await,
        }
    }
}

impl std::fmt::Display for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Procedure { name, args } => {
                write!(f, "CALL {} ({} args)", name, args.len())
            }
            Statement::Sql(sql) => f.write_str(sql),
        }
    }
}

/// Run a statement inside a transaction: commit on success, roll back on failure.
pub(crate) async fn execute_write<C: Connector>(
    pool: &ConnectionPool<C>,
    statement: Statement<'_>,
) -> DbResult<()> {
    statement.validate()?;
    trace!(phase = ?Phase::Acquiring);
    let mut lease = pool.acquire().await?;
    let mut cursor: Option<CursorOf<C>> = None;

    let outcome: DbResult<()> = async {
        trace!(phase = ?Phase::Executing);
        cursor = Some(statement.open(lease.connection()).await?);
        trace!(phase = ?Phase::Committing);
        lease.connection().commit().await
    }
    .await;

    let outcome = match outcome {
        Ok(()) => Ok(()),
        Err(err) => {
            trace!(phase = ?Phase::RollingBack);
            debug!(error = %err, statement = %statement, "Write failed, rolling back");
            match lease.connection().rollback().await {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    error!(
                        error = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed, transaction state unknown"
                    );
                    Err(DbError::rollback(err, rollback_err))
                }
            }
        }
    };

    release(cursor, lease).await;
    outcome
}

/// Run a statement and read its rows. No transaction is committed.
pub(crate) async fn execute_select<C: Connector>(
    pool: &ConnectionPool<C>,
    statement: Statement<'_>,
    fetch: Fetch,
) -> DbResult<Selection> {
    statement.validate()?;
    trace!(phase = ?Phase::Acquiring);
    let mut lease = pool.acquire().await?;
    let mut cursor: Option<CursorOf<C>> = None;

    let outcome: DbResult<Selection> = async {
        trace!(phase = ?Phase::Executing);
        let opened = cursor.insert(statement.open(lease.connection()).await?);
        collect_selection(opened, fetch)
    }
    .await;

    release(cursor, lease).await;
    outcome
}

/// Close the cursor, then hand the connection back. Failures are only logged.
async fn release<C: Connector>(cursor: Option<CursorOf<C>>, lease: PooledConnection<C>) {
    trace!(phase = ?Phase::Releasing);
    if let Some(cursor) = cursor {
        if let Err(e) = cursor.close() {
            warn!(error = %e, "Failed to close cursor");
        }
    }
    if let Err(e) = lease.release().await {
        warn!(error = %e, "Failed to return connection to pool");
    }
}

/// A database client backed by its own connection pool.
///
/// Clones share the pool, so one client can serve any number of concurrent
/// tasks. Separate constructions get separate pools, which lets one process
/// talk to several databases at once.
pub struct DatabaseClient<C: Connector = MySqlConnector> {
    pool: ConnectionPool<C>,
}

impl<C: Connector> Clone for DatabaseClient<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C: Connector> std::fmt::Debug for DatabaseClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("pool", &self.pool)
            .finish()
    }
}

impl DatabaseClient<MySqlConnector> {
    /// Connect to MySQL with the default pool sizing (5 cached, 5 max, blocking).
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

impl<C: Connector> DatabaseClient<C> {
    /// Create a client over a fresh pool.
    ///
    /// Fails with [`DbError::Configuration`] if the pool cannot be established.
    pub async fn with_connector(connector: C, config: PoolConfig) -> DbResult<Self> {
        let pool = ConnectionPool::open(connector, config).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Whether both clients use the same underlying pool.
    pub fn same_pool(&self, other: &Self) -> bool {
        self.pool.ptr_eq(&other.pool)
    }

    /// Call a stored procedure and commit.
    ///
    /// With no arguments the procedure is invoked in its argument-less form.
    pub async fn execute_procedure(&self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        debug!(procedure = %name, args = args.len(), "Executing procedure");
        execute_write(&self.pool, Statement::Procedure { name, args }).await
    }

    /// Call a procedure that inserts data. Same protocol as [`Self::execute_procedure`].
    pub async fn insert_by_procedure(&self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        self.execute_procedure(name, args).await
    }

    /// Call a procedure that updates data. Same protocol as [`Self::execute_procedure`].
    pub async fn update_by_procedure(&self, name: &str, args: &[QueryParam]) -> DbResult<()> {
        self.execute_procedure(name, args).await
    }

    /// Call a stored procedure and map its rows to records.
    pub async fn select_procedure(
        &self,
        name: &str,
        fetch: Fetch,
        args: &[QueryParam],
    ) -> DbResult<Selection> {
        debug!(procedure = %name, args = args.len(), ?fetch, "Selecting by procedure");
        execute_select(&self.pool, Statement::Procedure { name, args }, fetch).await
    }

    /// Run a literal SELECT. The SQL is passed through verbatim; the caller owns
    /// escaping and injection safety.
    pub async fn select_sql(&self, sql: &str, fetch: Fetch) -> DbResult<Selection> {
        debug!(sql = %sql, ?fetch, "Selecting by SQL");
        execute_select(&self.pool, Statement::Sql(sql), fetch).await
    }

    /// Run a literal data-modifying statement and commit. Passed through verbatim.
    pub async fn update_sql(&self, sql: &str) -> DbResult<()> {
        debug!(sql = %sql, "Updating by SQL");
        execute_write(&self.pool, Statement::Sql(sql)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_display() {
        let args = [QueryParam::Int(1), QueryParam::Int(2)];
        let call = Statement::Procedure {
            name: "echo",
            args: &args,
        };
        assert_eq!(call.to_string(), "CALL echo (2 args)");
        assert_eq!(Statement::Sql("SELECT 1").to_string(), "SELECT 1");
    }

    #[test]
    fn test_blank_statements_are_invalid_input() {
        let blank_call = Statement::Procedure { name: " ", args: &[] };
        assert!(matches!(
            blank_call.validate(),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(matches!(
            Statement::Sql("\n").validate(),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(Statement::Sql("SELECT 1").validate().is_ok());
    }
}
