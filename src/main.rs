use std::{
    process,
    sync::{Arc, OnceLock},
};

use otelgen::{
    config::Config,
    core::{probe::HttpProbe, service::TelemetryService},
    logger::LoggerManager,
    print_error,
    telemetry::TelemetryPipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

#[tokio::main]
async fn main() {
    let cfg = config();
    let settings = Arc::new(cfg.settings.clone());

    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });

    let pipeline = TelemetryPipeline::install(&settings).unwrap_or_else(|e| {
        print_error!("Failed to install telemetry pipeline: {}", e);
        process::exit(1);
    });

    let bridge = cfg
        .logger
        .otlp
        .enabled
        .then(|| pipeline.log_layer(&cfg.logger.level));
    logger_manager.init(bridge).unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });

    info!("Starting application...");
    info!("otelgen version {}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", settings);

    let probe = HttpProbe::new(settings.clone()).unwrap_or_else(|e| {
        error!("Failed to build HTTP client: {}", e);
        pipeline.shutdown();
        process::exit(1);
    });

    let service = TelemetryService::new(settings, Arc::new(probe));
    let cancel = CancellationToken::new();

    let failed = match service.run_until(cancel.clone(), shutdown_signal()).await {
        Ok(()) => false,
        Err(e) => {
            error!("Application terminated unexpectedly: {}", e);
            true
        }
    };

    service.stop(&cancel);
    debug!("Final connection state: {}", service.status().state());
    pipeline.shutdown();
    info!("Shutdown complete");

    if failed {
        process::exit(1);
    }
}
