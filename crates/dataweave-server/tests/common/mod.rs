//! Common test utilities for Dataweave server integration tests
//!
//! Each test gets its own in-memory SQLite database with the schema applied. The pool holds a
//! single connection that never expires, since an in-memory database lives only as long as its
//! connection.

#![allow(dead_code)]

use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use dataweave_server::db::schema::create_schema;

/// Fresh in-memory database with the product schema
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    create_schema(&pool).await.expect("Failed to create schema");
    pool
}

/// A queue message shaped like the ones the ingest side publishes
pub fn sample_message(id: &str, price: &str, stock: &str) -> Value {
    json!({
        "available_price": price,
        "stock": stock,
        "source": "X",
        "meta_info": format!(
            "{{'reference_product_id': '{}', 'account_code': 'ACC-1', 'crawl_page_counter': 3, \
             'fulfilment_modes': ['delivery', 'pickup'], 'seller_name': 'Acme'}}",
            id
        ),
    })
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}
