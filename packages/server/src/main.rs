use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::ObjectMirror;
use common::storage::s3::S3Mirror;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::cli::{self, Cli, Command};
use server::config::AppConfig;
use server::database::init_db;
use server::detector::YoloDetector;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    if let Some(Command::AddUser { username, password }) = args.command {
        let db = init_db(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to database")?;
        cli::add_user(&db, username.clone(), password).await?;
        println!("User '{username}' created");
        return Ok(());
    }

    for dir in [config.storage.original_dir(), config.storage.predicted_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let db = init_db(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to database")?;

    let detector = YoloDetector::load(&config.detector).context("loading detector")?;

    let mirror: Option<Arc<dyn ObjectMirror>> = match &config.mirror {
        Some(mirror_config) => {
            let mirror = S3Mirror::new(mirror_config).context("configuring mirror")?;
            info!(bucket = %mirror.target(), "Mirroring to object storage");
            Some(Arc::new(mirror))
        }
        None => {
            warn!("No mirror configured; remote ingestion is disabled");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing listen address")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        detector: Arc::new(detector),
        mirror,
    };

    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
