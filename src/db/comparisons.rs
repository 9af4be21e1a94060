use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::ComparisonRow;
use crate::error::Result;
use crate::types::Comparison;

/// Drop every stored comparison. Returns the number removed.
pub async fn clear<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<u64> {
    let res = sqlx::query("DELETE FROM comparisons").execute(exec).await?;
    Ok(res.rows_affected())
}

/// Insert or replace the comparison for `c.auction_id`.
pub async fn save<'e, E: SqliteExecutor<'e>>(exec: E, c: &Comparison) -> Result<()> {
    let match_type = c.match_type.to_string();
    let rating = c.rating.to_string();
    let sample_size = c.sample_size as i64;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO comparisons (
            auction_id, city, neighborhood, auction_price_per_sqm, market_median_per_sqm,
            sample_size, match_type, deviation_pct, bargain_score, rating, price_capped,
            compared_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&c.auction_id)
    .bind(&c.city)
    .bind(&c.neighborhood)
    .bind(c.auction_price_per_sqm)
    .bind(c.market_median_per_sqm)
    .bind(sample_size)
    .bind(match_type)
    .bind(c.deviation_pct)
    .bind(c.bargain_score)
    .bind(rating)
    .bind(c.price_capped)
    .bind(Utc::now())
    .execute(exec)
    .await?;
    Ok(())
}

/// Highest-scoring comparisons with a bargain rating, best first.
pub async fn top_bargains(pool: &SqlitePool, limit: i64) -> Result<Vec<ComparisonRow>> {
    let rows = sqlx::query_as(
        r#"
        SELECT auction_id, city, neighborhood, auction_price_per_sqm, market_median_per_sqm,
               sample_size, match_type, deviation_pct, bargain_score, rating, price_capped
        FROM comparisons
        WHERE rating IN ('EXCELLENT', 'GOOD', 'FAIR')
        ORDER BY bargain_score DESC, auction_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
