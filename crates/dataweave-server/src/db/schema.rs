//! Table definitions for products and their metadata
//!
//! `available_price` is kept as TEXT holding the canonical two-decimal form. A numeric column
//! would let SQLite coerce `12.50` into the float `12.5`.

use sqlx::SqlitePool;
use tracing::info;

use super::DbResult;

const CREATE_PRODUCTS: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    reference_product_id TEXT PRIMARY KEY NOT NULL,
    available_price      TEXT NOT NULL,
    in_stock             BOOLEAN NOT NULL,
    source               TEXT NOT NULL
)
"#;

const CREATE_META_INFO: &str = r#"
CREATE TABLE IF NOT EXISTS meta_info (
    id                           INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id                   TEXT NOT NULL UNIQUE
                                 REFERENCES products (reference_product_id),
    account_code                 TEXT,
    crawl_page_counter           INTEGER,
    postal_zip_code              TEXT,
    postal_zip_name              TEXT,
    store_code                   TEXT,
    place_name                   TEXT,
    admin_name1                  TEXT,
    bundle_versions_row_pk_hash  TEXT,
    bundle_variant_field_mapping TEXT,
    bundle_definition            TEXT,
    fulfilment_modes             TEXT,
    seller_name                  TEXT,
    bundle_match_type            TEXT,
    reference_product_id         TEXT,
    bundle_definition_hash       TEXT,
    major_version_end_time       TEXT
)
"#;

/// Create both tables if they do not exist
pub async fn create_schema(pool: &SqlitePool) -> DbResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(CREATE_PRODUCTS).execute(&mut *tx).await?;
    sqlx::query(CREATE_META_INFO).execute(&mut *tx).await?;
    tx.commit().await?;

    info!("Database schema created");
    Ok(())
}

/// Drop both tables, metadata first
pub async fn drop_schema(pool: &SqlitePool) -> DbResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS meta_info")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS products")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Database schema dropped");
    Ok(())
}
