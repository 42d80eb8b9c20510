use clap::Parser;
use r2d2::Pool;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod session;
mod sql;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::DuckDbConnectionManager;
use crate::llm::schema::ORDERS_TABLE;
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Opening DuckDB connection pool at {}",
        config.database.connection_string
    );
    let db_manager = DuckDbConnectionManager::new(config.database.connection_string.clone());
    let pool = Pool::builder()
        .max_size(config.database.pool_size as u32)
        .build(db_manager)?;

    // One-shot seeding mode: load the CSV and exit
    if let Some(csv_path) = &args.seed {
        let conn = pool.get()?;
        let rows = db::seed::seed_orders(&conn, csv_path)?;
        info!("Loaded {} rows into table \"{}\"", rows, ORDERS_TABLE);
        return Ok(());
    }

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    // Create application state
    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager));

    // Start the web server
    info!(
        "Starting orderlens server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                as Box<dyn std::error::Error>);
        }
    }

    Ok(())
}
