use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agora::config::{Cli, Command, Config};
use agora::state::AppState;
use agora::{db, routes, seed, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Seed => run_seed(&config),
        Command::Watch { url, interval_ms } => {
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.polling.interval_ms));
            let fetch_timeout = Duration::from_millis(config.polling.fetch_timeout_ms);
            watch::watch(url, interval, fetch_timeout).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;
    tracing::info!("Uploads directory: {}", config.uploads_path().display());

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState { db: pool, config };
    let app = routes::app(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn run_seed(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let mut conn = pool.get()?;
    let posts = seed::seed_posts(&mut conn, chrono::Utc::now())?;
    tracing::info!("Seeded {} posts into {}", posts.len(), config.db_path().display());
    Ok(())
}
