//! follownet-scrape - FollowNet extraction service
//!
//! Streams follower/stargazer records extracted from social platforms over
//! SSE, with pause/resume/stop control and CSV export of finished sessions.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use follownet_scrape::config::{self, Cli};
use follownet_scrape::extractor::ExtractorRegistry;
use follownet_scrape::session::{SessionManager, SessionSettings};
use follownet_scrape::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::resolve(&cli).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::log_filter(&config).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting follownet-scrape v{}", env!("CARGO_PKG_VERSION"));
    info!("Build: {} ({})", env!("GIT_HASH"), env!("BUILD_PROFILE"));

    let extractors = ExtractorRegistry::with_defaults(&config.github)
        .context("Failed to initialize extractors")?;
    info!("Extractors: {:?}", extractors.platforms());

    let settings = SessionSettings::from(&config.sessions);
    let drain_timeout = settings.grace_period + Duration::from_secs(1);
    let sessions = SessionManager::new(extractors, settings);

    let state = AppState::new(sessions.clone(), config.cors.allowed_origins.clone());
    let app = build_router(state);

    let addr = config::listen_address(&config);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions, drain_timeout))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then stop every live session
async fn shutdown_signal(sessions: SessionManager, drain_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    if !sessions.shutdown(drain_timeout).await {
        warn!("Some sessions did not stop in time");
    }
}
