//! Feature modules implementing the Dataweave API
//!
//! Each feature is a vertical slice with its own commands, queries, and routes.
//!
//! # Features
//!
//! - **products**: the transform/persist engine used by the queue consumer, and the read API
//!   (`/products`, `/score`)
//! - **ingest**: file upload onto the work queue (`/ingest`)

pub mod ingest;
pub mod products;

use std::sync::Arc;

use axum::Router;
use dataweave_ingest::RecordSink;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// SQLite connection pool for product reads
    pub db: sqlx::SqlitePool,
    /// Destination for uploaded records
    pub sink: Arc<dyn RecordSink>,
    /// Work queue that uploads are published to
    pub queue: String,
}

/// Creates the router with every feature's routes merged at the root
pub fn router(state: FeatureState) -> Router<()> {
    let ingest_state = ingest::IngestState {
        sink: state.sink,
        queue: state.queue,
    };

    Router::new()
        .merge(products::products_routes().with_state(state.db))
        .merge(ingest::ingest_routes().with_state(ingest_state))
}
