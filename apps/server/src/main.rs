use std::sync::Arc;

use anyhow::Context;
use campusnet_api::{build_router, AppState};
use campusnet_config::{load as load_config, AppConfig};
use campusnet_database::{initialize_database, purge_expired, RetentionPolicy};
use campusnet_runtime::{shutdown_signal, telemetry, BackendServices, BackgroundJobs};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "campusnet")]
#[command(about = "CampusNet backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and background jobs
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Fetch every configured news source once
    ScrapeNews,
    /// Delete expired sessions, notifications, advisor sessions and news
    Purge,
    /// Create an administrator, or promote an existing account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "Administrator")]
        full_name: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::ScrapeNews => scrape_news(config).await,
        Commands::Purge => purge(config).await,
        Commands::CreateAdmin {
            email,
            full_name,
            password,
        } => create_admin(config, &email, &full_name, password).await,
    }
}

fn app_state(services: &BackendServices) -> AppState {
    AppState::new(
        services.db_pool.clone(),
        services.authenticator.clone(),
        Arc::clone(&services.advisor),
        services.news.clone(),
        services.config.notifications.retention_days,
    )
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting CampusNet backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let jobs = BackgroundJobs::spawn(&services);
    let app = build_router(app_state(&services));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, background_jobs = jobs.len(), "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    jobs.shutdown().await;
    info!("backend shut down");
    Ok(())
}

async fn migrate(config: AppConfig) -> anyhow::Result<()> {
    initialize_database(&config.database)
        .await
        .context("failed to migrate database")?;
    println!("Database at {} is up to date", config.database.url);
    Ok(())
}

async fn scrape_news(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    if services.news.sources().is_empty() {
        println!("No news sources configured");
        return Ok(());
    }

    let report = services.news.run_once().await;
    println!("{:<30} {:>8} {:>8}  {}", "Source", "Fetched", "New", "Error");
    println!("{}", "-".repeat(70));
    for source in &report.sources {
        println!(
            "{:<30} {:>8} {:>8}  {}",
            source.name,
            source.fetched,
            source.inserted,
            source.error.as_deref().unwrap_or("")
        );
    }
    println!(
        "Inserted {} items, {} sources failed",
        report.inserted(),
        report.failed()
    );
    Ok(())
}

async fn purge(config: AppConfig) -> anyhow::Result<()> {
    let pool = initialize_database(&config.database)
        .await
        .context("failed to initialise database")?;
    let report = purge_expired(&pool, RetentionPolicy::from_config(&config))
        .await
        .context("retention purge failed")?;

    println!("Sessions:          {}", report.sessions);
    println!("Notifications:     {}", report.notifications);
    println!("Advisor sessions:  {}", report.advisor_sessions);
    println!("News items:        {}", report.news);
    println!("Total removed:     {}", report.total());
    Ok(())
}

async fn create_admin(
    config: AppConfig,
    email: &str,
    full_name: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password().await?,
    };

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    let user = services
        .authenticator
        .create_admin(email, &password, full_name)
        .await
        .context("failed to create admin")?;

    println!("Admin ready: {} ({})", user.email, user.public_id);
    Ok(())
}

async fn read_password() -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Password: ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    anyhow::ensure!(!password.is_empty(), "password must not be empty");
    Ok(password)
}
