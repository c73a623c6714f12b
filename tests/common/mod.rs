//! Scripted in-memory driver shared by the integration tests.
//!
//! Every driver call is appended to an event log tagged with the id of the
//! connection that made it. Failures and result sets are configured through
//! [`Script`] before (or between) operations.

#![allow(dead_code)]

use mysql_pool_client::config::PoolConfig;
use mysql_pool_client::db::{Connection, Connector, Cursor};
use mysql_pool_client::error::{DbError, DbResult};
use mysql_pool_client::models::QueryParam;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    CallProcedure {
        name: String,
        args: Option<Vec<QueryParam>>,
    },
    Execute(String),
    Commit,
    Rollback,
    CursorClose,
    Reset,
    Close,
}

/// Columns and rows returned by the next statement.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl ResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_connect: bool,
    pub fail_execute: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_cursor_close: bool,
    pub fail_reset: bool,
    pub fail_fetch: bool,
    /// `None` means the statement has no result description
    pub result: Option<ResultSet>,
    /// Time spent inside each execute or procedure call
    pub execute_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<(usize, Event)>>,
    script: Mutex<Script>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Shared {
    fn record(&self, conn: usize, event: Event) {
        self.events.lock().unwrap().push((conn, event));
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Script) -> Self {
        let connector = Self::default();
        *connector.shared.script.lock().unwrap() = script;
        connector
    }

    /// Change the script for later calls.
    pub fn update(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.shared.script.lock().unwrap());
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Events with the id of the connection that produced them.
    pub fn tagged_events(&self) -> Vec<(usize, Event)> {
        self.shared.events.lock().unwrap().clone()
    }

    /// Events after the pool warm-up, i.e. without `Connect`.
    pub fn protocol_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| *e != Event::Connect)
            .collect()
    }

    pub fn clear_events(&self) {
        self.shared.events.lock().unwrap().clear();
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn connects(&self) -> usize {
        self.count(&Event::Connect)
    }

    /// Highest number of statements that were executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, _config: &PoolConfig) -> DbResult<MockConnection> {
        if self.shared.script().fail_connect {
            return Err(DbError::connection(
                "Access denied for user",
                "Check the user name and password",
            ));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.record(id, Event::Connect);
        Ok(MockConnection {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockConnection {
    id: usize,
    shared: Arc<Shared>,
}

impl MockConnection {
    async fn run(&mut self, event: Event) -> DbResult<MockCursor> {
        self.shared.record(self.id, event);
        let script = self.shared.script();

        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = script.execute_delay {
            tokio::time::sleep(delay).await;
        }
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);

        if script.fail_execute {
            return Err(DbError::database(
                "You have an error in your SQL syntax",
                Some("42000".to_string()),
                "Check the statement",
            ));
        }
        Ok(MockCursor {
            conn: self.id,
            shared: Arc::clone(&self.shared),
            columns: script.result.as_ref().map(|r| r.columns.clone()),
            rows: script.result.map(|r| r.rows.into()).unwrap_or_default(),
            fail_fetch: script.fail_fetch,
            fail_close: script.fail_cursor_close,
        })
    }

    fn step(&self, event: Event, fail: bool, what: &str) -> DbResult<()> {
        self.shared.record(self.id, event);
        if fail {
            Err(DbError::connection(format!("{} failed", what), "Reconnect"))
        } else {
            Ok(())
        }
    }
}

impl Connection for MockConnection {
    type Cursor = MockCursor;

    async fn call_procedure(
        &mut self,
        name: &str,
        args: Option<&[QueryParam]>,
    ) -> DbResult<MockCursor> {
        self.run(Event::CallProcedure {
            name: name.to_string(),
            args: args.map(<[QueryParam]>::to_vec),
        })
        .await
    }

    async fn execute(&mut self, sql: &str) -> DbResult<MockCursor> {
        self.run(Event::Execute(sql.to_string())).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        let fail = self.shared.script().fail_commit;
        self.step(Event::Commit, fail, "commit")
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let fail = self.shared.script().fail_rollback;
        self.step(Event::Rollback, fail, "rollback")
    }

    async fn reset(&mut self) -> DbResult<()> {
        let fail = self.shared.script().fail_reset;
        self.step(Event::Reset, fail, "reset")
    }

    async fn close(self) -> DbResult<()> {
        self.shared.record(self.id, Event::Close);
        Ok(())
    }
}

pub struct MockCursor {
    conn: usize,
    shared: Arc<Shared>,
    columns: Option<Vec<String>>,
    rows: VecDeque<Vec<JsonValue>>,
    fail_fetch: bool,
    fail_close: bool,
}

impl MockCursor {
    fn fetch_error() -> DbError {
        DbError::connection("Lost connection to MySQL server during query", "Retry")
    }
}

impl Cursor for MockCursor {
    fn description(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn fetch_one(&mut self) -> DbResult<Option<Vec<JsonValue>>> {
        if self.fail_fetch {
            return Err(Self::fetch_error());
        }
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> DbResult<Vec<Vec<JsonValue>>> {
        if self.fail_fetch {
            return Err(Self::fetch_error());
        }
        Ok(self.rows.drain(..).collect())
    }

    fn close(self) -> DbResult<()> {
        self.shared.record(self.conn, Event::CursorClose);
        if self.fail_close {
            Err(DbError::internal("cursor close failed"))
        } else {
            Ok(())
        }
    }
}

/// Pool settings with the given sizing; connection fields are placeholders.
pub fn pool_config(min_cached: u32, max_connections: u32) -> PoolConfig {
    PoolConfig::new("localhost", 3306, "app", "secret", "app_db")
        .with_min_cached(min_cached)
        .with_max_connections(max_connections)
}
