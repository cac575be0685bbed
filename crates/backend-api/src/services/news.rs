use std::collections::HashMap;

use campusnet_news::{NewsScraper, ScrapeReport};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use super::ServiceError;
use crate::routes::models::{
    NewsItemResponse, NewsSourceResponse, ScrapeReportResponse, SourceReportResponse,
};
use crate::util::Page;

#[derive(Debug, FromRow)]
struct NewsRow {
    public_id: String,
    source: String,
    category: Option<String>,
    title: String,
    link: String,
    summary: Option<String>,
    image_url: Option<String>,
    published_at: Option<String>,
    scraped_at: String,
}

impl From<NewsRow> for NewsItemResponse {
    fn from(row: NewsRow) -> Self {
        Self {
            id: row.public_id,
            source: row.source,
            category: row.category,
            title: row.title,
            link: row.link,
            summary: row.summary,
            image_url: row.image_url,
            published_at: row.published_at,
            scraped_at: row.scraped_at,
        }
    }
}

const NEWS_COLUMNS: &str =
    "public_id, source, category, title, link, summary, image_url, published_at, scraped_at";

/// Newest first by publication time, falling back to when it was scraped.
pub async fn list_news(
    pool: &SqlitePool,
    source: Option<&str>,
    category: Option<&str>,
    page: Page,
) -> Result<Vec<NewsItemResponse>, ServiceError> {
    let source = source.map(str::trim).filter(|s| !s.is_empty());
    let category = category.map(str::trim).filter(|c| !c.is_empty());

    let rows: Vec<NewsRow> = sqlx::query_as(&format!(
        r#"
        SELECT {NEWS_COLUMNS}
        FROM news
        WHERE (?1 IS NULL OR source = ?1 COLLATE NOCASE)
          AND (?2 IS NULL OR category = ?2 COLLATE NOCASE)
        ORDER BY COALESCE(published_at, scraped_at) DESC, id DESC
        LIMIT ?3 OFFSET ?4
        "#
    ))
    .bind(source)
    .bind(category)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_news(pool: &SqlitePool, news_id: &str) -> Result<NewsItemResponse, ServiceError> {
    let row: NewsRow = sqlx::query_as(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE public_id = ?"))
        .bind(news_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("news item not found"))?;

    Ok(row.into())
}

/// Configured sources in configuration order, followed by sources that only
/// exist in stored items (for example after a source was removed).
pub async fn list_sources(
    pool: &SqlitePool,
    scraper: &NewsScraper,
) -> Result<Vec<NewsSourceResponse>, ServiceError> {
    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT source, COUNT(*) FROM news GROUP BY source ORDER BY source")
            .fetch_all(pool)
            .await?;
    let mut counts: HashMap<String, i64> = counts.into_iter().collect();

    let mut sources: Vec<NewsSourceResponse> = scraper
        .sources()
        .iter()
        .map(|source| NewsSourceResponse {
            name: source.name.clone(),
            url: Some(source.url.clone()),
            category: source.category.clone(),
            item_count: counts.remove(&source.name).unwrap_or(0),
        })
        .collect();

    let mut stale: Vec<_> = counts.into_iter().collect();
    stale.sort();
    sources.extend(stale.into_iter().map(|(name, item_count)| NewsSourceResponse {
        name,
        url: None,
        category: None,
        item_count,
    }));

    Ok(sources)
}

pub async fn scrape_now(scraper: &NewsScraper) -> ScrapeReportResponse {
    let report = scraper.run_once().await;
    info!(
        inserted = report.inserted(),
        failed = report.failed(),
        "manual news scrape finished"
    );
    report.into()
}

impl From<ScrapeReport> for ScrapeReportResponse {
    fn from(report: ScrapeReport) -> Self {
        Self {
            inserted: report.inserted(),
            failed: report.failed(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            sources: report
                .sources
                .into_iter()
                .map(|source| SourceReportResponse {
                    name: source.name,
                    url: source.url,
                    fetched: source.fetched,
                    inserted: source.inserted,
                    error: source.error,
                })
                .collect(),
        }
    }
}
