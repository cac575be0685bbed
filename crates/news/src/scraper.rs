use std::sync::Arc;
use std::time::{Duration, Instant};

use campusnet_config::{NewsConfig, NewsSourceConfig};
use campusnet_database::{elapsed_millis, now_timestamp, timestamp_before};
use futures_util::{stream, StreamExt};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::parser::{parse_feed, NewsItem};
use crate::store::insert_items;
use crate::NewsError;

const USER_AGENT: &str = concat!("campusnet-news/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub url: String,
    pub fetched: usize,
    pub inserted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub started_at: String,
    pub finished_at: String,
    pub sources: Vec<SourceReport>,
}

impl ScrapeReport {
    pub fn inserted(&self) -> u64 {
        self.sources.iter().map(|source| source.inserted).sum()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|source| source.error.is_some()).count()
    }
}

#[derive(Clone)]
pub struct NewsScraper {
    http: reqwest::Client,
    pool: SqlitePool,
    sources: Arc<Vec<NewsSourceConfig>>,
    max_concurrent: usize,
    retention_days: u32,
    interval: Duration,
}

impl NewsScraper {
    pub fn new(pool: SqlitePool, config: &NewsConfig) -> Result<Self, NewsError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            http,
            pool,
            sources: Arc::new(config.sources.clone()),
            max_concurrent: config.max_concurrent_fetches.max(1),
            retention_days: config.retention_days,
            interval: Duration::from_secs(config.scrape_interval_seconds),
        })
    }

    pub fn sources(&self) -> &[NewsSourceConfig] {
        &self.sources
    }

    /// Whether [`run_forever`](Self::run_forever) has anything to do.
    pub fn is_scheduled(&self) -> bool {
        !self.interval.is_zero() && !self.sources.is_empty()
    }

    /// Scrape every source once with bounded concurrency. A failing source is
    /// recorded in the report and never aborts the others.
    pub async fn run_once(&self) -> ScrapeReport {
        let started = Instant::now();
        let started_at = now_timestamp();

        let mut results: Vec<(usize, SourceReport)> =
            stream::iter(self.sources.iter().cloned().enumerate())
                .map(|(index, source)| async move {
                    let report = match self.scrape_source(&source).await {
                        Ok((fetched, inserted)) => SourceReport {
                            name: source.name.clone(),
                            url: source.url.clone(),
                            fetched,
                            inserted,
                            error: None,
                        },
                        Err(error) => {
                            warn!(source = %source.name, url = %source.url, error = %error, "news source failed");
                            SourceReport {
                                name: source.name.clone(),
                                url: source.url.clone(),
                                fetched: 0,
                                inserted: 0,
                                error: Some(error.to_string()),
                            }
                        }
                    };
                    (index, report)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);
        let report = ScrapeReport {
            started_at,
            finished_at: now_timestamp(),
            sources: results.into_iter().map(|(_, report)| report).collect(),
        };

        info!(
            sources = report.sources.len(),
            inserted = report.inserted(),
            failed = report.failed(),
            elapsed_ms = elapsed_millis(started.elapsed()),
            "news scrape complete"
        );
        report
    }

    /// Scrape on the configured interval until the task is dropped. The first
    /// run starts immediately.
    pub async fn run_forever(self) {
        if !self.is_scheduled() {
            info!("news scheduler disabled");
            return;
        }

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }

    async fn scrape_source(&self, source: &NewsSourceConfig) -> Result<(usize, u64), NewsError> {
        let url = url::Url::parse(&source.url)
            .map_err(|error| NewsError::InvalidSource(format!("{}: {error}", source.url)))?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let items = self.within_retention(parse_feed(&body, source)?);
        let inserted = insert_items(&self.pool, &items).await?;

        debug!(source = %source.name, fetched = items.len(), inserted, "news source scraped");
        Ok((items.len(), inserted))
    }

    fn within_retention(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        if self.retention_days == 0 {
            return items;
        }
        let cutoff = timestamp_before(chrono::Duration::days(i64::from(self.retention_days)));
        items
            .into_iter()
            .filter(|item| match &item.published_at {
                Some(published) => *published >= cutoff,
                None => true,
            })
            .collect()
    }
}
