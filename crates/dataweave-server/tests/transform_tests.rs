//! Integration tests for storing queued product messages

mod common;

use common::{count, sample_message, test_pool};
use serde_json::json;

use dataweave_server::consumer::{process_message, Disposition, RetryPolicy};
use dataweave_server::features::products::{transform_and_store, TransformError};
use dataweave_server::models::{MetaInfo, Product};

#[tokio::test]
async fn test_message_is_stored_with_metadata() {
    let pool = test_pool().await;

    let stored = transform_and_store(&pool, &sample_message("P1", "12.5", "In Stock"))
        .await
        .unwrap();

    assert_eq!(
        stored.product,
        Product {
            reference_product_id: "P1".to_string(),
            available_price: "12.50".to_string(),
            in_stock: true,
            source: "X".to_string(),
        }
    );

    let product: Product = sqlx::query_as("SELECT * FROM products WHERE reference_product_id = ?")
        .bind("P1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(product, stored.product);

    let meta: MetaInfo = sqlx::query_as("SELECT * FROM meta_info WHERE product_id = ?")
        .bind("P1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(meta, stored.meta_info);
    assert_eq!(meta.account_code.as_deref(), Some("ACC-1"));
    assert_eq!(meta.crawl_page_counter, Some(3));
    assert_eq!(meta.seller_name.as_deref(), Some("Acme"));
    assert_eq!(meta.reference_product_id.as_deref(), Some("P1"));
    assert_eq!(meta.postal_zip_code, None);
}

#[tokio::test]
async fn test_stock_other_than_in_stock_is_unavailable() {
    let pool = test_pool().await;

    for (id, stock) in [("A", "Out of Stock"), ("B", "in stock"), ("C", "")] {
        let stored = transform_and_store(&pool, &sample_message(id, "1", stock))
            .await
            .unwrap();
        assert!(!stored.product.in_stock, "stock {:?} should not be available", stock);
    }

    let message = json!({
        "available_price": "1",
        "stock": null,
        "source": "X",
        "meta_info": "{'reference_product_id': 'D'}",
    });
    let stored = transform_and_store(&pool, &message).await.unwrap();
    assert!(!stored.product.in_stock);
}

#[tokio::test]
async fn test_structured_fields_are_stored_as_compact_json() {
    let pool = test_pool().await;

    let message = json!({
        "available_price": 3,
        "stock": "In Stock",
        "source": "Y",
        "meta_info": {
            "reference_product_id": "P2",
            "fulfilment_modes": ["delivery", "pickup"],
            "bundle_definition": {"items": [1, 2]},
            "bundle_variant_field_mapping": null,
        },
    });
    let stored = transform_and_store(&pool, &message).await.unwrap();

    assert_eq!(stored.product.available_price, "3.00");
    assert_eq!(
        stored.meta_info.fulfilment_modes.as_deref(),
        Some(r#"["delivery","pickup"]"#)
    );
    assert_eq!(stored.meta_info.bundle_definition.as_deref(), Some(r#"{"items":[1,2]}"#));
    assert_eq!(stored.meta_info.bundle_variant_field_mapping.as_deref(), Some("null"));
}

#[tokio::test]
async fn test_python_literal_metadata() {
    let pool = test_pool().await;

    let message = json!({
        "available_price": "0.125",
        "stock": "In Stock",
        "source": "X",
        "meta_info": "{'reference_product_id': 'P3', 'fulfilment_modes': ('delivery',), \
                      'bundle_definition': None, 'seller_name': \"O'Brien\"}",
    });
    let stored = transform_and_store(&pool, &message).await.unwrap();

    // Half-even rounding
    assert_eq!(stored.product.available_price, "0.12");
    assert_eq!(stored.meta_info.fulfilment_modes.as_deref(), Some(r#"["delivery"]"#));
    assert_eq!(stored.meta_info.bundle_definition.as_deref(), Some("null"));
    assert_eq!(stored.meta_info.seller_name.as_deref(), Some("O'Brien"));
}

#[tokio::test]
async fn test_duplicate_leaves_first_row_unchanged() {
    let pool = test_pool().await;

    transform_and_store(&pool, &sample_message("P1", "12.50", "In Stock"))
        .await
        .unwrap();
    let err = transform_and_store(&pool, &sample_message("P1", "99.99", "Out of Stock"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransformError::DuplicateProduct(ref id) if id == "P1"));
    assert!(!err.is_transient());
    assert!(matches!(
        RetryPolicy::default().disposition(&Err::<(), _>(err), 0),
        Disposition::DeadLetter { .. }
    ));

    let product: Product = sqlx::query_as("SELECT * FROM products WHERE reference_product_id = ?")
        .bind("P1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(product.available_price, "12.50");
    assert!(product.in_stock);
    assert_eq!(count(&pool, "products").await, 1);
    assert_eq!(count(&pool, "meta_info").await, 1);
}

#[tokio::test]
async fn test_failed_metadata_insert_rolls_back_product() {
    let pool = test_pool().await;
    sqlx::query("DROP TABLE meta_info").execute(&pool).await.unwrap();

    let err = transform_and_store(&pool, &sample_message("P1", "12.50", "In Stock"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransformError::Database(_)));
    assert_eq!(count(&pool, "products").await, 0);
}

#[tokio::test]
async fn test_invalid_messages_write_nothing() {
    let pool = test_pool().await;

    let missing_source = json!({
        "available_price": "1.00",
        "stock": "In Stock",
        "meta_info": "{'reference_product_id': 'P1'}",
    });
    assert!(matches!(
        transform_and_store(&pool, &missing_source).await.unwrap_err(),
        TransformError::MissingField("source")
    ));

    let bad_price = sample_message("P1", "twelve", "In Stock");
    assert!(matches!(
        transform_and_store(&pool, &bad_price).await.unwrap_err(),
        TransformError::InvalidPrice(_)
    ));

    let bad_meta = json!({
        "available_price": "1.00",
        "stock": "In Stock",
        "source": "X",
        "meta_info": "{'reference_product_id': ",
    });
    assert!(matches!(
        transform_and_store(&pool, &bad_meta).await.unwrap_err(),
        TransformError::MetaInfo(_)
    ));

    let no_id = json!({
        "available_price": "1.00",
        "stock": "In Stock",
        "source": "X",
        "meta_info": "{'seller_name': 'Acme'}",
    });
    assert!(matches!(
        transform_and_store(&pool, &no_id).await.unwrap_err(),
        TransformError::MissingField("reference_product_id")
    ));

    assert_eq!(count(&pool, "products").await, 0);
    assert_eq!(count(&pool, "meta_info").await, 0);
}

#[tokio::test]
async fn test_process_message_decodes_body() {
    let pool = test_pool().await;

    let body = serde_json::to_vec(&sample_message("P9", "5", "In Stock")).unwrap();
    let stored = process_message(&pool, &body).await.unwrap();
    assert_eq!(stored.product.reference_product_id, "P9");

    let err = process_message(&pool, b"[1, 2").await.unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));

    let err = process_message(&pool, b"[1, 2]").await.unwrap_err();
    assert!(matches!(err, TransformError::NotAnObject));
}

#[tokio::test]
async fn test_zero_prices_are_stored_with_two_decimals() {
    let pool = test_pool().await;

    for (id, price) in [("Z1", "0"), ("Z2", "0.004"), ("Z3", "-0.001"), ("Z4", "1e-30000000")] {
        let stored = transform_and_store(&pool, &sample_message(id, price, "In Stock"))
            .await
            .unwrap();
        assert_eq!(stored.product.available_price, "0.00", "{}", price);
    }

    let prices: Vec<String> = sqlx::query_scalar("SELECT available_price FROM products")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert!(prices.iter().all(|p| p == "0.00"));
}

#[tokio::test]
async fn test_huge_exponent_price_is_rejected() {
    let pool = test_pool().await;

    let err = transform_and_store(&pool, &sample_message("P1", "1e30000000", "In Stock"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::InvalidPrice(_)));
    assert_eq!(count(&pool, "products").await, 0);
}
