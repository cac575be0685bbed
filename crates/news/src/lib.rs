//! News ingestion: fetches configured RSS/Atom sources, normalises their
//! entries and stores them, skipping links that are already known.

mod parser;
mod scraper;
mod store;

pub use parser::{parse_feed, strip_html, NewsItem, MAX_SUMMARY_CHARS};
pub use scraper::{NewsScraper, ScrapeReport, SourceReport};
pub use store::insert_items;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    Status(u16),
    #[error("feed could not be parsed: {0}")]
    Parse(String),
    #[error("invalid source url: {0}")]
    InvalidSource(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
