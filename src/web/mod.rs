//! Web server module

mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use middleware::RequestLoggingLayer;

pub struct AppState {
    pub db: Database,
}

/// The route table
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/group/get-all", get(routes::all_groups))
        .route("/group/create", post(routes::create_group))
        .route("/group/update", put(routes::update_group).patch(routes::update_group))
        .route("/group/delete/:id", delete(routes::remove_group))
        .route("/group/get-students", get(routes::group_students))
        .route("/group/get-students/:id", get(routes::group_students))
        .route("/group/run-filters", post(routes::run_group_filters))
        .route("/student/get-all", get(routes::all_students))
        .route("/health", get(routes::health))
        .layer(RequestLoggingLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config, db: Database) -> Result<()> {
    let state = Arc::new(AppState { db });
    let app = router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Server has started on {}. Open http://{}/student/get-all to see results",
        addr, addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Re-run the group filters on a fixed period
pub fn start_background_tasks(db: Database, every: Duration) {
    info!("Scheduled group filter runs every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = db.run_group_filters(Utc::now()).await {
                tracing::error!("Scheduled group filter run failed: {}", e);
            }
        }
    });
}
