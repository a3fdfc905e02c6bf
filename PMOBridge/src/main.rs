use axum::routing::get;
use pmocatalog::CatalogClient;
use pmodownload::DownloadManager;
use pmogateway::AppState;
use pmohealth::HealthMonitor;
use pmotranscode::EngineLoader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod downloads;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ========== PHASE 1 : Configuration et santé ==========

    let config = pmoconfig::get_config();

    info!("📡 Starting catalog mirror health monitoring...");
    let monitor = Arc::new(HealthMonitor::from_config(&config));
    monitor.initialize();

    // ========== PHASE 2 : Composants métier ==========

    info!("🗄️ Building response cache and gateway state...");
    let state = AppState::from_config(&config, monitor.clone());

    let catalog = Arc::new(CatalogClient::new(monitor.clone()));

    let loader = Arc::new(EngineLoader::with_asset(
        config.get_engine_url().filter(|url| !url.is_empty()),
        PathBuf::from(config.get_engine_dir()?),
        config.get_countdown_secs(),
    ));

    let manager = Arc::new(DownloadManager::new());
    let download_api = downloads::DownloadApi {
        manager,
        catalog,
        loader,
        directory: PathBuf::from(config.get_download_dir()?),
        transcode_enabled: config.get_transcode_enabled(),
    };

    // ========== PHASE 3 : Serveur HTTP ==========

    let app = pmogateway::router(state)
        .merge(downloads::router(download_api))
        .route(
            "/info",
            get(|| async { axum::Json(serde_json::json!({"version": "0.1.0"})) }),
        );

    let port = config.get_http_port();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("🌐 PMOBridge listening on port {}", port);
    info!("✅ PMOBridge is ready!");
    info!("Press Ctrl+C to stop...");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 PMOBridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
    }
}
