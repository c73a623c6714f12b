//! Pooled MySQL client
//!
//! A small client over a bounded connection pool. Stored procedures and literal
//! SQL are executed through one protocol: lease a connection, run, commit or roll
//! back, then always release. Results come back as JSON records keyed by column
//! name.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::{Config, PoolConfig};
pub use db::{DatabaseClient, LocalDatabaseClient};
pub use error::{DbError, DbResult};
pub use models::{Fetch, QueryParam, Record, Selection};
