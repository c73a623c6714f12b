//! Integration tests for the write protocol: execute, commit, roll back, release.

mod common;

use common::{Event, MockConnector, Script, pool_config};
use mysql_pool_client::db::DatabaseClient;
use mysql_pool_client::error::DbError;
use mysql_pool_client::models::QueryParam;

async fn client(connector: &MockConnector) -> DatabaseClient<MockConnector> {
    let client = DatabaseClient::with_connector(connector.clone(), pool_config(1, 2))
        .await
        .unwrap();
    connector.clear_events();
    client
}

fn call(name: &str, args: Option<Vec<QueryParam>>) -> Event {
    Event::CallProcedure {
        name: name.to_string(),
        args,
    }
}

#[tokio::test]
async fn test_execute_procedure_commits_then_releases() {
    let connector = MockConnector::new();
    let client = client(&connector).await;

    client
        .execute_procedure("add_user", &["ada".into(), QueryParam::Int(36)])
        .await
        .unwrap();

    assert_eq!(
        connector.protocol_events(),
        vec![
            call(
                "add_user",
                Some(vec![QueryParam::String("ada".into()), QueryParam::Int(36)])
            ),
            Event::Commit,
            Event::CursorClose,
            Event::Reset,
        ]
    );
    let status = client.pool().status().await;
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 1);
}

#[tokio::test]
async fn test_no_args_uses_argument_less_call() {
    let connector = MockConnector::new();
    let client = client(&connector).await;

    client.execute_procedure("refresh_stats", &[]).await.unwrap();

    assert_eq!(connector.protocol_events()[0], call("refresh_stats", None));
}

#[tokio::test]
async fn test_insert_and_update_follow_execute_protocol() {
    let connector = MockConnector::new();
    let client = client(&connector).await;

    client.execute_procedure("p", &[QueryParam::Int(1)]).await.unwrap();
    let executed = connector.protocol_events();
    connector.clear_events();

    client.insert_by_procedure("p", &[QueryParam::Int(1)]).await.unwrap();
    let inserted = connector.protocol_events();
    connector.clear_events();

    client.update_by_procedure("p", &[QueryParam::Int(1)]).await.unwrap();
    let updated = connector.protocol_events();

    assert_eq!(executed, inserted);
    assert_eq!(executed, updated);
}

#[tokio::test]
async fn test_execute_failure_rolls_back_and_propagates() {
    let connector = MockConnector::with_script(Script {
        fail_execute: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    let err = client
        .execute_procedure("add_user", &["ada".into()])
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        DbError::Database { sql_state: Some(state), .. } if state == "42000"
    ));
    // No cursor was opened, so there is nothing to close.
    assert_eq!(
        connector.protocol_events(),
        vec![
            call("add_user", Some(vec![QueryParam::String("ada".into())])),
            Event::Rollback,
            Event::Reset,
        ]
    );
    assert_eq!(client.pool().status().await.in_use, 0);
}

#[tokio::test]
async fn test_commit_failure_rolls_back_and_closes_cursor() {
    let connector = MockConnector::with_script(Script {
        fail_commit: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    let err = client.update_sql("DELETE FROM users").await.unwrap_err();

    assert!(err.to_string().contains("commit failed"));
    assert_eq!(
        connector.protocol_events(),
        vec![
            Event::Execute("DELETE FROM users".into()),
            Event::Commit,
            Event::Rollback,
            Event::CursorClose,
            Event::Reset,
        ]
    );
}

#[tokio::test]
async fn test_rollback_failure_reports_both_errors() {
    let connector = MockConnector::with_script(Script {
        fail_execute: true,
        fail_rollback: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    let err = client.update_sql("UPDATE t SET x = 1").await.unwrap_err();

    match err {
        DbError::Rollback { original, source } => {
            assert!(matches!(*original, DbError::Database { .. }));
            assert!(source.to_string().contains("rollback failed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.pool().status().await.in_use, 0);
}

#[tokio::test]
async fn test_rollback_runs_on_the_same_connection() {
    let connector = MockConnector::with_script(Script {
        fail_commit: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    client.update_sql("UPDATE t SET x = 1").await.unwrap_err();

    let tagged = connector.tagged_events();
    let conn = tagged[0].0;
    assert!(tagged.iter().all(|(id, _)| *id == conn));
}

#[tokio::test]
async fn test_update_sql_passes_statement_verbatim() {
    let connector = MockConnector::new();
    let client = client(&connector).await;
    let sql = "UPDATE users SET name = 'O''Brien' WHERE id = 7";

    client.update_sql(sql).await.unwrap();

    assert_eq!(connector.protocol_events()[0], Event::Execute(sql.into()));
    assert_eq!(connector.count(&Event::Commit), 1);
}

#[tokio::test]
async fn test_cursor_close_failure_is_swallowed() {
    let connector = MockConnector::with_script(Script {
        fail_cursor_close: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    client.update_sql("INSERT INTO t VALUES (1)").await.unwrap();

    // The connection still goes back to the pool.
    assert_eq!(connector.count(&Event::Reset), 1);
    assert_eq!(client.pool().status().await.idle, 1);
}

#[tokio::test]
async fn test_reset_failure_discards_connection_but_succeeds() {
    let connector = MockConnector::with_script(Script {
        fail_reset: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    client.update_sql("INSERT INTO t VALUES (1)").await.unwrap();

    assert_eq!(connector.count(&Event::Close), 1);
    let status = client.pool().status().await;
    assert_eq!(status.idle, 0);
    assert_eq!(status.in_use, 0);

    // The next operation opens a fresh connection.
    connector.update(|s| s.fail_reset = false);
    client.update_sql("INSERT INTO t VALUES (2)").await.unwrap();
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_failure_keeps_original_error_when_rollback_succeeds() {
    let connector = MockConnector::with_script(Script {
        fail_execute: true,
        ..Default::default()
    });
    let client = client(&connector).await;

    let err = client.execute_procedure("p", &[]).await.unwrap_err();

    assert!(!matches!(err, DbError::Rollback { .. }));
    assert_eq!(err.sql_state(), Some("42000"));
}

#[tokio::test]
async fn test_call_forms_differ_and_each_commits_once() {
    let connector = MockConnector::new();
    let client = client(&connector).await;

    client.execute_procedure("noop", &[]).await.unwrap();
    client
        .execute_procedure("echo", &[QueryParam::Int(1), QueryParam::Int(2)])
        .await
        .unwrap();

    let calls: Vec<Event> = connector
        .protocol_events()
        .into_iter()
        .filter(|e| matches!(e, Event::CallProcedure { .. }))
        .collect();
    assert_eq!(
        calls,
        vec![
            call("noop", None),
            call("echo", Some(vec![QueryParam::Int(1), QueryParam::Int(2)])),
        ]
    );
    assert_eq!(connector.count(&Event::Commit), 2);
    assert_eq!(connector.count(&Event::Rollback), 0);
}

#[tokio::test]
async fn test_blank_procedure_name_is_rejected_before_leasing() {
    let connector = MockConnector::new();
    let client = client(&connector).await;

    let err = client.execute_procedure("", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    let err = client.update_sql("   ").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));

    assert!(connector.protocol_events().is_empty());
    assert_eq!(client.pool().status().await.idle, 1);
}
