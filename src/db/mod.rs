//! Database access layer.
//!
//! - [`driver`]: the traits a database driver implements
//! - [`pool`]: bounded connection pool with eager warm-up
//! - [`client`]: the five client operations and their transaction protocol
//! - [`lifecycle`]: shared, per-instance and single-owner clients
//! - [`mysql`]: the sqlx-backed MySQL driver

pub mod client;
pub mod driver;
pub mod lifecycle;
pub mod mysql;
pub(crate) mod params;
pub mod pool;
pub mod record;
pub mod types;

pub use client::DatabaseClient;
pub use driver::{Connection, Connector, Cursor};
pub use lifecycle::{LocalDatabaseClient, SingletonRegistry};
pub use mysql::{MySqlConnector, MySqlCursor};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
