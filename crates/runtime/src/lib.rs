use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use campusnet_advisor::AdvisorClient;
use campusnet_auth::Authenticator;
use campusnet_config::AppConfig;
use campusnet_database::{initialize_database, purge_expired, RetentionPolicy};
use campusnet_news::NewsScraper;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub advisor: Arc<AdvisorClient>,
    pub news: NewsScraper,
    pub config: Arc<AppConfig>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let advisor = Arc::new(
            AdvisorClient::new(&config.advisor).context("failed to build advisor client")?,
        );
        let news = NewsScraper::new(db_pool.clone(), &config.news)
            .context("failed to build news scraper")?;

        if advisor.is_enabled() {
            info!(model = %advisor.model(), "advisor ready");
        } else {
            warn!("advisor API key missing, advisor endpoints will return 503");
        }
        info!(sources = news.sources().len(), "news scraper ready");

        Ok(Self {
            db_pool,
            authenticator,
            advisor,
            news,
            config: Arc::new(config.clone()),
        })
    }
}

/// Long running maintenance tasks. Dropping the handle does not stop them;
/// call [`BackgroundJobs::shutdown`].
pub struct BackgroundJobs {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundJobs {
    pub fn spawn(services: &BackendServices) -> Self {
        let mut handles = Vec::new();

        if services.news.is_scheduled() {
            let scraper = services.news.clone();
            handles.push(tokio::spawn(scraper.run_forever()));
            info!(
                interval_seconds = services.config.news.scrape_interval_seconds,
                "news scheduler started"
            );
        } else {
            info!("news scheduler disabled");
        }

        let purge_interval = services.config.maintenance.purge_interval_seconds;
        if purge_interval > 0 {
            let pool = services.db_pool.clone();
            let policy = RetentionPolicy::from_config(&services.config);
            handles.push(tokio::spawn(run_purge_loop(
                pool,
                policy,
                Duration::from_secs(purge_interval),
            )));
            info!(interval_seconds = purge_interval, "retention purge started");
        } else {
            info!("retention purge disabled");
        }

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("background jobs stopped");
    }
}

async fn run_purge_loop(pool: SqlitePool, policy: RetentionPolicy, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(error) = purge_expired(&pool, policy).await {
            warn!(error = %error, "retention purge failed");
        }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
