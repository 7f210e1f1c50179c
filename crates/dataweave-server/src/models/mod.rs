//! Persisted row types

use serde::{Deserialize, Serialize};

/// A row of `products`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub reference_product_id: String,
    /// Canonical fixed-point text with two fractional digits
    pub available_price: String,
    pub in_stock: bool,
    pub source: String,
}

/// A row of `meta_info`, one per product
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetaInfo {
    pub id: i64,
    pub product_id: String,
    pub account_code: Option<String>,
    pub crawl_page_counter: Option<i64>,
    pub postal_zip_code: Option<String>,
    pub postal_zip_name: Option<String>,
    pub store_code: Option<String>,
    pub place_name: Option<String>,
    pub admin_name1: Option<String>,
    pub bundle_versions_row_pk_hash: Option<String>,
    /// Compact JSON text
    pub bundle_variant_field_mapping: Option<String>,
    /// Compact JSON text
    pub bundle_definition: Option<String>,
    /// Compact JSON text
    pub fulfilment_modes: Option<String>,
    pub seller_name: Option<String>,
    pub bundle_match_type: Option<String>,
    pub reference_product_id: Option<String>,
    pub bundle_definition_hash: Option<String>,
    pub major_version_end_time: Option<String>,
}
