//! mysql-pool-client - Main entry point.
//!
//! Runs one statement or procedure call against MySQL through the pooled client
//! and prints the result as JSON on stdout. Logs go to stderr.

use mysql_pool_client::config::{Command, Config};
use mysql_pool_client::db::DatabaseClient;
use mysql_pool_client::error::{DbError, DbResult};
use mysql_pool_client::logging;
use mysql_pool_client::models::{Fetch, QueryParam};
use serde_json::json;
use tracing::{error, info};

async fn run(config: &Config) -> DbResult<serde_json::Value> {
    let pool_config = config.pool_config()?;
    info!(target_db = %pool_config.masked_url(), "Connecting");

    let client = DatabaseClient::from_config(pool_config).await?;

    let result = match &config.command {
        Command::Query { sql, one } => client
            .select_sql(sql, Fetch::from(*one))
            .await
            .map(|rows| json!(rows)),
        Command::Exec { sql } => client
            .update_sql(sql)
            .await
            .map(|()| json!({ "committed": true })),
        Command::Call {
            procedure,
            args,
            select,
            one,
        } => {
            let args: Vec<QueryParam> = args.iter().map(|a| QueryParam::parse_lenient(a)).collect();
            if *select {
                client
                    .select_procedure(procedure, Fetch::from(*one), &args)
                    .await
                    .map(|rows| json!(rows))
            } else {
                client
                    .execute_procedure(procedure, &args)
                    .await
                    .map(|()| json!({ "committed": true }))
            }
        }
    };

    client.pool().close().await;
    result
}

fn report(err: &DbError) {
    error!(error = %err, "Command failed");
    eprintln!("Error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("Suggestion: {}", suggestion);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Keep the guard alive until exit so file logs are flushed
    let log_guard = logging::init(&config.log_settings())?;

    info!("Starting mysql-pool-client v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            report(&e);
            drop(log_guard);
            std::process::exit(1);
        }
    }
}
