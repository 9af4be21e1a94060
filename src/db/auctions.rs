use sqlx::SqlitePool;

use crate::db::models::AuctionRow;
use crate::error::Result;
use crate::types::AuctionListing;

/// Every auction with a price and a size, in id order.
pub async fn load_priced(pool: &SqlitePool) -> Result<Vec<AuctionListing>> {
    let rows: Vec<AuctionRow> = sqlx::query_as(
        r#"
        SELECT id, city, neighborhood, address, size_sqm, price_eur, rooms,
               property_type, description, is_partial_ownership
        FROM auctions
        WHERE price_eur IS NOT NULL AND size_sqm IS NOT NULL
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[cfg(test)]
pub(crate) async fn insert(pool: &SqlitePool, a: &AuctionListing) {
    sqlx::query(
        r#"
        INSERT INTO auctions (
            id, city, neighborhood, address, size_sqm, price_eur, rooms,
            property_type, description, is_partial_ownership
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&a.id)
    .bind(&a.city)
    .bind(&a.neighborhood)
    .bind(&a.address)
    .bind(a.size_sqm)
    .bind(a.price_eur)
    .bind(a.rooms)
    .bind(&a.property_type)
    .bind(&a.description)
    .bind(a.is_partial_ownership)
    .execute(pool)
    .await
    .unwrap();
}
