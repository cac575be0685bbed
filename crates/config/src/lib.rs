use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "campusnet.toml",
    "config/campusnet.toml",
    "crates/config/campusnet.toml",
    "../campusnet.toml",
    "../config/campusnet.toml",
    "../../campusnet.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub advisor: AdvisorConfig,
    pub news: NewsConfig,
    pub notifications: NotificationConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://campusnet.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_seconds: u64,
    pub min_password_length: usize,
    /// Email domains allowed to register. Empty means any domain.
    pub allowed_email_domains: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 86_400 * 7,
            min_password_length: 8,
            allowed_email_domains: Vec::new(),
        }
    }
}

/// Settings for the AI career advisor backed by an OpenRouter compatible API.
///
/// ```
/// use campusnet_config::AdvisorConfig;
///
/// let advisor = AdvisorConfig::default();
/// assert_eq!(advisor.base_url, "https://openrouter.ai/api/v1");
/// assert_eq!(advisor.request_timeout_seconds, 30);
/// assert!(advisor.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout_seconds: u64,
    /// Number of prior session messages replayed to the model.
    pub history_limit: usize,
    pub session_ttl_days: u32,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            request_timeout_seconds: 30,
            history_limit: 20,
            session_ttl_days: 30,
            referer: None,
            title: Some("CampusNet Advisor".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub sources: Vec<NewsSourceConfig>,
    /// Zero disables the scheduler.
    pub scrape_interval_seconds: u64,
    pub max_concurrent_fetches: usize,
    pub request_timeout_seconds: u64,
    pub retention_days: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            scrape_interval_seconds: 3_600,
            max_concurrent_fetches: 4,
            request_timeout_seconds: 20,
            retention_days: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub retention_days: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Zero disables the purge job.
    pub purge_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            purge_interval_seconds: 3_600,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use campusnet_config::load;
///
/// std::env::remove_var("CAMPUSNET_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?;

    let environment_overrides = config::Environment::with_prefix("CAMPUSNET")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("auth.allowed_email_domains")
        .try_parsing(true);

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CAMPUSNET_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CAMPUSNET_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    config.auth.allowed_email_domains = config
        .auth
        .allowed_email_domains
        .iter()
        .map(|domain| domain.trim().trim_start_matches('@').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect();

    if config.advisor.api_key.is_none() {
        config.advisor.api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
    }

    debug!(
        http = ?config.http,
        database = %config.database.url,
        news_sources = config.news.sources.len(),
        advisor_enabled = config.advisor.api_key.is_some(),
        "loaded backend configuration"
    );
    Ok(config)
}
