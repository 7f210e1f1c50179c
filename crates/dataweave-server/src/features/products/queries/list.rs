use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{MetaInfo, Product};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProductsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListItem {
    pub reference_product_id: String,
    pub available_price: String,
    pub in_stock: bool,
    pub source: String,
    pub meta_info: MetaInfo,
}

#[derive(Debug, thiserror::Error)]
pub enum ListProductsError {
    #[error("limit must be greater than or equal to 1")]
    InvalidLimit,
    #[error("offset must be greater than or equal to 0")]
    InvalidOffset,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ListProductsQuery {
    pub fn validate(&self) -> Result<(), ListProductsError> {
        if self.limit.is_some_and(|limit| limit < 1) {
            return Err(ListProductsError::InvalidLimit);
        }
        if self.offset.is_some_and(|offset| offset < 0) {
            return Err(ListProductsError::InvalidOffset);
        }
        Ok(())
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Products that have metadata, ordered by id, with their metadata attached
#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: &SqlitePool,
    query: ListProductsQuery,
) -> Result<Vec<ProductListItem>, ListProductsError> {
    query.validate()?;

    let products: Vec<Product> = sqlx::query_as(
        r#"
        SELECT p.reference_product_id, p.available_price, p.in_stock, p.source
        FROM products p
        JOIN meta_info m ON m.product_id = p.reference_product_id
        ORDER BY p.reference_product_id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(pool)
    .await?;

    if products.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT * FROM meta_info WHERE product_id IN (");
    let mut ids = builder.separated(", ");
    for product in &products {
        ids.push_bind(product.reference_product_id.clone());
    }
    ids.push_unseparated(")");

    let mut meta_by_product: HashMap<String, MetaInfo> = builder
        .build_query_as::<MetaInfo>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|meta| (meta.product_id.clone(), meta))
        .collect();

    // A product deleted between the two reads is skipped.
    let items = products
        .into_iter()
        .filter_map(|product| {
            let meta_info = meta_by_product.remove(&product.reference_product_id)?;
            Some(ProductListItem {
                reference_product_id: product.reference_product_id,
                available_price: product.available_price,
                in_stock: product.in_stock,
                source: product.source,
                meta_info,
            })
        })
        .collect();

    Ok(items)
}
