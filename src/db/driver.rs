//! Driver boundary.
//!
//! The pool and the client only talk to a database through these traits. The
//! production implementation lives in [`crate::db::mysql`]; tests plug in
//! scripted drivers.
//!
//! Methods return `impl Future + Send` so every operation can run on a
//! multi-threaded runtime without boxing.

use crate::config::PoolConfig;
use crate::error::DbResult;
use crate::models::QueryParam;
use serde_json::Value as JsonValue;
use std::future::Future;

/// Opens physical connections for a pool.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Open one connection using the settings in `config`, unmodified.
    fn connect(
        &self,
        config: &PoolConfig,
    ) -> impl Future<Output = DbResult<Self::Connection>> + Send;
}

/// A live database connection.
pub trait Connection: Send + 'static {
    type Cursor: Cursor;

    /// Invoke a stored procedure and open a cursor over its result.
    ///
    /// `None` is the argument-less call form. `Some(&[])` is an explicit empty
    /// argument list; drivers may treat the two differently.
    fn call_procedure(
        &mut self,
        name: &str,
        args: Option<&[QueryParam]>,
    ) -> impl Future<Output = DbResult<Self::Cursor>> + Send;

    /// Execute a literal statement, verbatim, and open a cursor over its result.
    fn execute(&mut self, sql: &str) -> impl Future<Output = DbResult<Self::Cursor>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Bring the connection back to a clean state before it re-enters the idle queue.
    fn reset(&mut self) -> impl Future<Output = DbResult<()>> + Send {
        async { Ok(()) }
    }

    /// Close the physical connection.
    fn close(self) -> impl Future<Output = DbResult<()>> + Send;
}

/// Result handle of one statement or procedure call.
pub trait Cursor: Send {
    /// Column names of the current result, in result order.
    ///
    /// `None` when the statement produced no result description.
    fn description(&self) -> Option<&[String]>;

    /// Next row, or `None` once the result is exhausted.
    fn fetch_one(&mut self) -> DbResult<Option<Vec<JsonValue>>>;

    /// All remaining rows, in fetch order.
    fn fetch_all(&mut self) -> DbResult<Vec<Vec<JsonValue>>>;

    fn close(self) -> DbResult<()>;
}
