//! Dataweave Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the Dataweave workspace members:
//!
//! - **Error Handling**: [`DataweaveError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber bootstrap shared by every binary
//! - **Queue**: the durable queue topology that publishers and consumers must agree on
//!
//! # Example
//!
//! ```no_run
//! use dataweave_common::logging::{init_logging, LogConfig};
//! use dataweave_common::queue::QueueTopology;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let topology = QueueTopology::new("products");
//!     assert_eq!(topology.dead_letter_queue(), "products.dead-letter");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod queue;

// Re-export commonly used types
pub use error::{DataweaveError, Result};
