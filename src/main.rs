//! LMS job service.
//!
//! Serves group management and bulk LMS account jobs over a JSON REST API.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lms_jobs::config::{LogFormat, ServerConfig};
use lms_jobs::db::{self, Repository};
use lms_jobs::jobs::JobRegistry;
use lms_jobs::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!("Starting LMS job service");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Finished jobs retained for {:?}", config.job_retention);

    if config.api_keys.is_empty() {
        tracing::warn!(
            "No API keys configured (LMS_API_KEY, LMS_API_KEYS). Authentication is disabled!"
        );
    } else {
        tracing::info!("{} API key(s) configured", config.api_keys.len());
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Start job registry and its reaper
    let jobs = JobRegistry::new();
    jobs.spawn_reaper(config.job_retention);

    let state = AppState {
        repo,
        jobs,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
