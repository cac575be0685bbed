use campusnet_database::{new_public_id, now_timestamp};
use sqlx::SqlitePool;

use crate::parser::NewsItem;

/// Insert items, ignoring links that already exist. Returns the number of new rows.
pub async fn insert_items(pool: &SqlitePool, items: &[NewsItem]) -> Result<u64, sqlx::Error> {
    if items.is_empty() {
        return Ok(0);
    }

    let scraped_at = now_timestamp();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for item in items {
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO news (public_id, source, category, title, link, summary, image_url, published_at, scraped_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_public_id())
        .bind(&item.source)
        .bind(&item.category)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.summary)
        .bind(&item.image_url)
        .bind(&item.published_at)
        .bind(&scraped_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
