//! Market repository: the persisted baseline of scraped listings.

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::MarketListingRow;
use crate::error::Result;
use crate::types::MarketListing;

const SELECT_LISTING: &str = "SELECT city, neighborhood, size_sqm, price_eur, price_per_sqm, \
                              rooms, source, scraped_at FROM market_listings";

/// Insert a listing, or refresh the row already holding the same
/// (city, size, price, source) tuple.
pub async fn upsert_listing<'e, E: SqliteExecutor<'e>>(exec: E, l: &MarketListing) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO market_listings (
            city, neighborhood, size_sqm, price_eur, price_per_sqm, rooms, source, scraped_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (city, size_sqm, price_eur, source) DO UPDATE SET
            neighborhood  = excluded.neighborhood,
            price_per_sqm = excluded.price_per_sqm,
            rooms         = excluded.rooms,
            scraped_at    = excluded.scraped_at
        "#,
    )
    .bind(&l.city)
    .bind(&l.neighborhood)
    .bind(l.size_sqm)
    .bind(l.price_eur)
    .bind(l.price_per_sqm)
    .bind(l.rooms)
    .bind(&l.source)
    .bind(l.scraped_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Delete listings scraped before `cutoff`. Returns the number removed.
pub async fn purge_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query("DELETE FROM market_listings WHERE scraped_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn listings_for_city(pool: &SqlitePool, city: &str) -> Result<Vec<MarketListing>> {
    let rows: Vec<MarketListingRow> = sqlx::query_as(&format!("{SELECT_LISTING} WHERE city = ?"))
        .bind(city)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn all_listings(pool: &SqlitePool) -> Result<Vec<MarketListing>> {
    let rows: Vec<MarketListingRow> =
        sqlx::query_as(&format!("{SELECT_LISTING} ORDER BY city, source, price_per_sqm"))
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_listings")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn listing(city: &str, size: f64, price: f64, source: &str) -> MarketListing {
        MarketListing {
            city: city.to_string(),
            neighborhood: None,
            size_sqm: size,
            price_eur: price,
            price_per_sqm: (price / size * 100.0).round() / 100.0,
            rooms: None,
            source: source.to_string(),
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reingesting_the_same_tuple_does_not_duplicate() {
        let pool = test_pool().await;
        let first = listing("София", 70.0, 140_000.0, "imot.bg");
        upsert_listing(&pool, &first).await.unwrap();

        let mut again = first.clone();
        again.neighborhood = Some("лозенец".to_string());
        again.rooms = Some(2);
        upsert_listing(&pool, &again).await.unwrap();

        assert_eq!(count(&pool).await.unwrap(), 1);
        let stored = listings_for_city(&pool, "София").await.unwrap();
        assert_eq!(stored[0].neighborhood.as_deref(), Some("лозенец"));
        assert_eq!(stored[0].rooms, Some(2));

        // Same numbers from another source are a separate price point.
        upsert_listing(&pool, &listing("София", 70.0, 140_000.0, "olx.bg")).await.unwrap();
        assert_eq!(count(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_rows() {
        let pool = test_pool().await;
        let mut stale = listing("Варна", 60.0, 90_000.0, "olx.bg");
        stale.scraped_at = Utc::now() - Duration::days(8);
        upsert_listing(&pool, &stale).await.unwrap();
        upsert_listing(&pool, &listing("Варна", 61.0, 91_000.0, "olx.bg")).await.unwrap();

        let removed = purge_older_than(&pool, Utc::now() - Duration::days(7)).await.unwrap();
        assert_eq!(removed, 1);
        let left = all_listings(&pool).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].size_sqm, 61.0);
    }

    #[tokio::test]
    async fn city_filter() {
        let pool = test_pool().await;
        upsert_listing(&pool, &listing("Варна", 60.0, 90_000.0, "olx.bg")).await.unwrap();
        upsert_listing(&pool, &listing("Русе", 60.0, 50_000.0, "olx.bg")).await.unwrap();
        let ruse = listings_for_city(&pool, "Русе").await.unwrap();
        assert_eq!(ruse.len(), 1);
        assert_eq!(ruse[0].city, "Русе");
    }
}
