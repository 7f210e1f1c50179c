//! Persist a product and its metadata in one transaction

use serde_json::Value;
use sqlx::SqlitePool;

use super::transform::{price_text, StoreProductCommand, TransformError};
use crate::models::{MetaInfo, Product};

/// Rows written by a successful store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProduct {
    pub product: Product,
    pub meta_info: MetaInfo,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        },
        _ => false,
    }
}

/// Insert the product, then its metadata, and commit
///
/// Nothing is written unless both inserts succeed. A product whose id already exists is
/// reported as [`TransformError::DuplicateProduct`] and the stored row is left as it was.
#[tracing::instrument(
    skip(pool, command),
    fields(reference_product_id = %command.product.reference_product_id)
)]
pub async fn handle(
    pool: &SqlitePool,
    command: StoreProductCommand,
) -> Result<StoredProduct, TransformError> {
    let StoreProductCommand { product, meta_info } = command;
    let product = Product {
        available_price: price_text(&product.available_price),
        reference_product_id: product.reference_product_id,
        in_stock: product.in_stock,
        source: product.source,
    };

    let duplicate = |e: sqlx::Error| {
        if is_unique_violation(&e) {
            TransformError::DuplicateProduct(product.reference_product_id.clone())
        } else {
            TransformError::Database(e)
        }
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO products (reference_product_id, available_price, in_stock, source)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&product.reference_product_id)
    .bind(&product.available_price)
    .bind(product.in_stock)
    .bind(&product.source)
    .execute(&mut *tx)
    .await
    .map_err(duplicate)?;

    let result = sqlx::query(
        r#"
        INSERT INTO meta_info (
            product_id, account_code, crawl_page_counter, postal_zip_code, postal_zip_name,
            store_code, place_name, admin_name1, bundle_versions_row_pk_hash,
            bundle_variant_field_mapping, bundle_definition, fulfilment_modes, seller_name,
            bundle_match_type, reference_product_id, bundle_definition_hash,
            major_version_end_time
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&product.reference_product_id)
    .bind(&meta_info.account_code)
    .bind(meta_info.crawl_page_counter)
    .bind(&meta_info.postal_zip_code)
    .bind(&meta_info.postal_zip_name)
    .bind(&meta_info.store_code)
    .bind(&meta_info.place_name)
    .bind(&meta_info.admin_name1)
    .bind(&meta_info.bundle_versions_row_pk_hash)
    .bind(&meta_info.bundle_variant_field_mapping)
    .bind(&meta_info.bundle_definition)
    .bind(&meta_info.fulfilment_modes)
    .bind(&meta_info.seller_name)
    .bind(&meta_info.bundle_match_type)
    .bind(&meta_info.reference_product_id)
    .bind(&meta_info.bundle_definition_hash)
    .bind(&meta_info.major_version_end_time)
    .execute(&mut *tx)
    .await
    .map_err(duplicate)?;

    tx.commit().await?;

    tracing::info!(in_stock = product.in_stock, "Product stored");

    let meta_info = MetaInfo {
        id: result.last_insert_rowid(),
        product_id: product.reference_product_id.clone(),
        account_code: meta_info.account_code,
        crawl_page_counter: meta_info.crawl_page_counter,
        postal_zip_code: meta_info.postal_zip_code,
        postal_zip_name: meta_info.postal_zip_name,
        store_code: meta_info.store_code,
        place_name: meta_info.place_name,
        admin_name1: meta_info.admin_name1,
        bundle_versions_row_pk_hash: meta_info.bundle_versions_row_pk_hash,
        bundle_variant_field_mapping: meta_info.bundle_variant_field_mapping,
        bundle_definition: meta_info.bundle_definition,
        fulfilment_modes: meta_info.fulfilment_modes,
        seller_name: meta_info.seller_name,
        bundle_match_type: meta_info.bundle_match_type,
        reference_product_id: meta_info.reference_product_id,
        bundle_definition_hash: meta_info.bundle_definition_hash,
        major_version_end_time: meta_info.major_version_end_time,
    };

    Ok(StoredProduct { product, meta_info })
}

/// Map a decoded queue message onto a product and persist it
pub async fn transform_and_store(
    pool: &SqlitePool,
    message: &Value,
) -> Result<StoredProduct, TransformError> {
    let command = StoreProductCommand::from_message(message)?;
    handle(pool, command).await
}
