//! Product read API
//!
//! - `GET /products?limit=20&offset=0` - Stored products with their metadata
//! - `GET /score` - Overall availability score

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use sqlx::SqlitePool;

use super::queries::{self, AvailabilityScore, ListProductsQuery, ProductListItem};
use crate::error::AppError;

pub fn products_routes() -> Router<SqlitePool> {
    Router::new()
        .route("/products", get(list_products))
        .route("/score", get(availability_score))
}

/// List products ordered by reference id
///
/// # Query Parameters
///
/// - `limit` - Page size (default: 20, minimum 1, capped at 1000)
/// - `offset` - Rows to skip (default: 0)
///
/// # Response
///
/// - `200 OK` - JSON array of products, each with a `meta_info` object
/// - `400 Bad Request` - Invalid query parameters
#[tracing::instrument(skip(pool))]
async fn list_products(
    State(pool): State<SqlitePool>,
    query: Result<Query<ListProductsQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<Vec<ProductListItem>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let items = queries::list::handle(&pool, query).await?;

    tracing::debug!(count = items.len(), "Products listed");
    Ok(Json(items))
}

#[tracing::instrument(skip(pool))]
async fn availability_score(
    State(pool): State<SqlitePool>,
) -> Result<Json<AvailabilityScore>, AppError> {
    Ok(Json(queries::score::handle(&pool).await?))
}
