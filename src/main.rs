//! Roll groups - attendance-incident student groups
//!
//! Serves CRUD endpoints for groups and recomputes group membership from
//! attendance records, on demand and on an optional schedule.

mod config;
mod db;
mod error;
mod web;

use anyhow::Result;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;
    init_tracing(&config.logging.level);
    info!("Starting roll groups service...");

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    if config.seed.demo_students {
        db.seed_demo_students().await?;
    }
    if config.seed.mock_attendance {
        db.seed_mock_attendance(config.seed.attendance_date()?).await?;
    }

    if config.filters.run_interval_secs > 0 {
        web::start_background_tasks(
            db.clone(),
            Duration::from_secs(config.filters.run_interval_secs),
        );
    }

    web::start_server(&config, db).await?;

    Ok(())
}
