//! File upload ingest
//!
//! `POST /ingest` accepts a multipart form whose `file` part is a JSON record file. The upload is
//! staged to a temporary file and streamed onto the work queue record by record.

pub mod routes;

use std::sync::Arc;

use dataweave_ingest::RecordSink;

pub use routes::ingest_routes;

/// State for the ingest routes
#[derive(Clone)]
pub struct IngestState {
    pub sink: Arc<dyn RecordSink>,
    pub queue: String,
}
