//! MySQL driver built on sqlx.
//!
//! Connections run with `autocommit = 0`, so every statement executes inside an
//! implicit transaction that the client ends with COMMIT or ROLLBACK. Results are
//! read eagerly, first result set only; the cursor hands out rows that are
//! already decoded.

use crate::config::PoolConfig;
use crate::db::driver::{Connection, Connector, Cursor};
use crate::db::params::{bind_param, call_sql};
use crate::db::types::{column_names, row_values};
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlConnectOptions, MySqlQueryResult, MySqlRow};
use sqlx::{ConnectOptions, Either, Executor, MySqlConnection};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Opens sqlx MySQL connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    fn connect_options(config: &PoolConfig) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .charset(&config.charset.to_lowercase());
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }
        options
    }
}

impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    async fn connect(&self, config: &PoolConfig) -> DbResult<MySqlConnection> {
        let mut conn = Self::connect_options(config)
            .connect()
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(&e),
                )
            })?;

        Executor::execute(&mut conn, "SET autocommit = 0").await?;
        debug!(host = %config.host, port = config.port, "Opened MySQL connection");
        Ok(conn)
    }
}

fn connection_suggestion(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("28000") => {
            "Check the user name and password"
        }
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42000") => {
            "Check that the database exists and the user may access it"
        }
        sqlx::Error::Io(_) => "Check that the MySQL server is running and reachable",
        sqlx::Error::Tls(_) => "Check the server's TLS configuration",
        _ => "Check the connection settings",
    }
}

impl Connection for MySqlConnection {
    type Cursor = MySqlCursor;

    async fn call_procedure(
        &mut self,
        name: &str,
        args: Option<&[QueryParam]>,
    ) -> DbResult<MySqlCursor> {
        let sql = call_sql(name, args.map(<[QueryParam]>::len));
        trace!(sql = %sql, "Calling procedure");

        let items: Vec<ResultItem> = match args {
            None => {
                Executor::fetch_many(&mut *self, sql.as_str())
                    .try_collect()
                    .await?
            }
            Some(args) => {
                let mut query = sqlx::query(&sql);
                for arg in args {
                    query = bind_param(query, arg);
                }
                Executor::fetch_many(&mut *self, query).try_collect().await?
            }
        };
        Ok(MySqlCursor::from_rows(first_result_set(items)))
    }

    async fn execute(&mut self, sql: &str) -> DbResult<MySqlCursor> {
        let items: Vec<ResultItem> = Executor::fetch_many(&mut *self, sql).try_collect().await?;
        Ok(MySqlCursor::from_rows(first_result_set(items)))
    }

    async fn commit(&mut self) -> DbResult<()> {
        Executor::execute(&mut *self, "COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        Executor::execute(&mut *self, "ROLLBACK").await?;
        Ok(())
    }

    /// Discard anything a select left open in the implicit transaction.
    async fn reset(&mut self) -> DbResult<()> {
        Connection::rollback(self).await
    }

    async fn close(self) -> DbResult<()> {
        sqlx::Connection::close(self).await?;
        Ok(())
    }
}

type ResultItem = Either<MySqlQueryResult, MySqlRow>;

/// Rows of the first result set.
///
/// A statement may produce several result sets (a procedure running more than
/// one SELECT, plus its trailing status). Each set ends with a `Left` summary;
/// everything after the first one is dropped.
fn first_result_set<L, R>(items: impl IntoIterator<Item = Either<L, R>>) -> Vec<R> {
    items
        .into_iter()
        .map_while(|item| match item {
            Either::Right(row) => Some(row),
            Either::Left(_) => None,
        })
        .collect()
}

/// Buffered result of one statement.
#[derive(Debug, Default)]
pub struct MySqlCursor {
    columns: Option<Vec<String>>,
    rows: VecDeque<Vec<JsonValue>>,
}

impl MySqlCursor {
    fn from_rows(rows: Vec<MySqlRow>) -> Self {
        let columns = rows.first().map(column_names);
        let rows = rows.iter().map(|row| row_values(row, true)).collect();
        Self { columns, rows }
    }

    /// A cursor over already-decoded rows.
    pub fn new(columns: Option<Vec<String>>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }
}

impl Cursor for MySqlCursor {
    fn description(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn fetch_one(&mut self) -> DbResult<Option<Vec<JsonValue>>> {
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> DbResult<Vec<Vec<JsonValue>>> {
        Ok(self.rows.drain(..).collect())
    }

    fn close(self) -> DbResult<()> {
        Ok(())
    }
}
