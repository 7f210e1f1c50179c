//! Dataweave Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The storage side of the Dataweave pipeline.
//!
//! # Overview
//!
//! - **Consumer**: pulls product records off the work queue and settles each delivery with
//!   `ack`, a bounded retry, or a dead-letter rejection
//! - **Transform engine**: validates a product message and writes the `products` and
//!   `meta_info` rows in one transaction
//! - **Read API**: `/products` (paginated join of both tables), `/score` (share of in-stock
//!   products), `/ingest` (file upload onto the work queue) and `/health`
//! - **Configuration**: environment-based, with `.env` support
//!
//! # Architecture
//!
//! Features are vertical slices split into commands (writes) and queries (reads). Writes only
//! happen through the consumer; the HTTP API never writes products directly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dataweave_ingest::AmqpPublisher;
//! use dataweave_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let sink = Arc::new(AmqpPublisher::new(config.broker.url.clone()));
//!     api::serve(config, sink).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod models;
pub mod shutdown;

pub use error::AppError;
