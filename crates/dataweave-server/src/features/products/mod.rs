//! Products: storing queued records and reading them back

pub mod commands;
pub mod literal;
pub mod queries;
pub mod routes;

pub use commands::{transform_and_store, StoreProductCommand, StoredProduct, TransformError};
pub use queries::{AvailabilityScore, ListProductsError, ListProductsQuery, ProductListItem};
pub use routes::products_routes;
