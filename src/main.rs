//! Exam Sessions - HTTP server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exam_sessions::{
    create_router, spawn_session_cleanup, AppState, Cache, CacheStore, Config,
    ExamSessionManager, InMemoryExamStore, SessionCleanupScheduler,
};

/// Main entry point for the exam session server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from `.env` and environment variables
/// 3. Connect the answer cache, falling back to in-process on failure
/// 4. Start the abandoned-session cleanup scheduler
/// 5. Serve HTTP until SIGINT/SIGTERM, then stop background work
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exam_sessions=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting exam session server");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        cache_backend = config.cache.backend.as_str(),
        answer_ttl_secs = config.answer_buffer_ttl.as_secs(),
        cleanup_enabled = config.cleanup.enabled,
        "Configuration loaded"
    );

    let cache = Arc::new(Cache::from_config(&config.cache).await);
    info!(backend = cache.backend().as_str(), "Answer cache ready");

    let store = Arc::new(InMemoryExamStore::new());
    if config.seed_demo_data {
        store.seed_demo().await;
        info!("Demo exam data loaded");
    }

    let sessions =
        ExamSessionManager::with_store(store.clone(), cache.clone(), config.answer_buffer_ttl);

    let shutdown = CancellationToken::new();
    let cleanup_handle = if config.cleanup.enabled {
        let scheduler = SessionCleanupScheduler::from_config(store, &config.cleanup);
        Some(spawn_session_cleanup(scheduler, shutdown.clone()))
    } else {
        info!("Session cleanup disabled");
        None
    };

    let app = create_router(AppState::new(sessions));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Some(handle) = cleanup_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Cleanup task ended abnormally");
        }
    }
    cache.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
