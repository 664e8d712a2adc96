//! Folio Server
//!
//! Runs the document core with its render cache maintenance: an orphan sweep
//! at startup and on a fixed interval until shutdown.

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_server::config::Config;
use folio_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "folio_server=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });
    let config = config.resolve()?;

    tracing::info!("Starting Folio Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Render cache: {}", config.cache_path.display());

    let sweep_interval = config.sweep_interval;
    let app_state = AppState::new(config);

    let purged = app_state.purge_orphaned_files().await;
    tracing::info!(purged = purged, "Startup cache sweep complete");

    let sweeper = sweep_interval.map(|interval| {
        let state = app_state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately and startup already swept
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = state.purge_orphaned_files().await;
                tracing::debug!(purged = purged, "Periodic cache sweep complete");
            }
        })
    });

    shutdown_signal().await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    let stats = app_state.cache().stats();
    tracing::info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        "Server shutdown complete"
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
