pub mod store;
pub mod transform;

pub use store::{transform_and_store, StoredProduct};
pub use transform::{price, price_text, NewMetaInfo, NewProduct, StoreProductCommand, TransformError};
