use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Share of stored products that are in stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityScore {
    /// `in_stock_products / total_products`, 0 when nothing is stored
    pub overall_availability_score: f64,
    pub total_products: i64,
    pub in_stock_products: i64,
}

impl AvailabilityScore {
    pub fn from_counts(total_products: i64, in_stock_products: i64) -> Self {
        let overall_availability_score = if total_products > 0 {
            in_stock_products as f64 / total_products as f64
        } else {
            0.0
        };

        Self {
            overall_availability_score,
            total_products,
            in_stock_products,
        }
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(pool: &SqlitePool) -> Result<AvailabilityScore, sqlx::Error> {
    let (total, in_stock): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN in_stock THEN 1 ELSE 0 END), 0)
        FROM products
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(AvailabilityScore::from_counts(total, in_stock))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_scores_zero() {
        let score = AvailabilityScore::from_counts(0, 0);
        assert_eq!(score.overall_availability_score, 0.0);
    }

    #[test]
    fn test_ratio() {
        let score = AvailabilityScore::from_counts(4, 3);
        assert_eq!(score.overall_availability_score, 0.75);
        assert_eq!(score.in_stock_products, 3);
    }
}
