use quickpane::activation::{ActivationMachine, NullSurface};
use quickpane::capture::{SelectionCapture, SystemAutomation};
use quickpane::chat::{ChatPipeline, OpenAiProvider};
use quickpane::config::AppConfig;
use quickpane::gateway::{GatewayServer, GatewayState};
use quickpane::settings::SettingsStore;
use quickpane::storage::Database;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let log_dir = AppConfig::config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    // Console + daily-rotated file logging
    let file_appender = tracing_appender::rolling::daily(&log_dir, "quickpane.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(non_blocking),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Quickpane starting... Log file: {:?}", log_dir.join("quickpane.log"));

    let config = AppConfig::load();
    let data_dir = config.data_dir();

    let db = match Database::init(&data_dir).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let settings = Arc::new(SettingsStore::new(&data_dir));
    let provider = Arc::new(OpenAiProvider::new(config.model.clone(), config.base_url.clone()));
    let pipeline = ChatPipeline::new(db.clone(), settings.clone(), provider);

    // Headless surface; the presentation shell swaps in the real window
    // adapter and forwards hotkey/blur events through the gateway.
    let capture = SelectionCapture::new(Arc::new(SystemAutomation::new()));
    let machine = Arc::new(ActivationMachine::new(Arc::new(NullSurface::new()), capture));

    let state = GatewayState {
        db,
        settings,
        pipeline,
        machine: machine.clone(),
    };

    let mut server = GatewayServer::new(state);
    if let Err(e) = server.start(config.port).await {
        tracing::error!("Failed to start gateway: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Gateway listening on 127.0.0.1:{}", config.port);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutdown requested");
    machine.shutdown();
    let _ = server.stop().await;
}
