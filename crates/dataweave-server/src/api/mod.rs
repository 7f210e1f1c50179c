//! HTTP application assembly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dataweave_ingest::RecordSink;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::{db, features, middleware, shutdown};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sink: Arc<dyn RecordSink>,
    pub queue: String,
}

/// Build the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    let feature_routes = features::router(features::FeatureState {
        db: state.db.clone(),
        sink: state.sink.clone(),
        queue: state.queue.clone(),
    });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state)
        .merge(feature_routes)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Serve the API until a shutdown signal arrives
pub async fn serve(config: Config, sink: Arc<dyn RecordSink>) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    db::schema::create_schema(&pool)
        .await
        .context("Failed to create database schema")?;

    let state = AppState {
        db: pool.clone(),
        sink,
        queue: config.broker.queue.clone(),
    };
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    let timeout_secs = config.server.shutdown_timeout_secs;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown::shutdown_signal().await;
            info!("Waiting up to {} seconds for connections to close", timeout_secs);
        })
        .await?;

    tokio::time::timeout(Duration::from_secs(timeout_secs), pool.close())
        .await
        .ok();
    info!("Server shut down gracefully");

    Ok(())
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Dataweave",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check(State(state): State<AppState>) -> Result<Response, AppError> {
    db::health_check(&state.db).await.map_err(|e| {
        tracing::error!("Database health check failed: {}", e);
        AppError::Unavailable("database unavailable".to_string())
    })?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected"
    }))
    .into_response())
}
