pub mod list;
pub mod score;

pub use list::{ListProductsError, ListProductsQuery, ProductListItem};
pub use score::AvailabilityScore;
