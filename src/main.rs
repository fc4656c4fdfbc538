use std::sync::Arc;

use tracing::{error, info, warn};

use microsvc::config::Config;
use microsvc::observability::{MetricsRecorder, RequestInterceptor, TracerProvider};
use microsvc::server::{service_routes, Server};
use microsvc::{logging, PKG_VERSION};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("Invalid configuration: {}", e);
        e
    })?;

    logging::init(&config.logging, &config.service.name)?;

    info!("Starting microsvc {}...", PKG_VERSION);
    config.log_summary();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Without a collector there is no point in serving.
    let provider = TracerProvider::initialize(&config.trace)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to initialize tracing");
            e
        })?;

    let metrics = Arc::new(MetricsRecorder::with_config(&config.metrics)?);
    let interceptor = RequestInterceptor::new(provider.tracer(), metrics);

    let server = Server::bind(
        config.server.clone(),
        service_routes(&config.service.name),
        interceptor,
    )
    .await?;

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown_signal() => {
            info!("Shutting down...");
        }
    }

    server.trigger_shutdown();
    if server.wait_for_drain(server.drain_timeout()).await {
        info!("All connections drained");
    }

    match provider.shutdown().await {
        Ok(()) => info!("Trace exporter shut down"),
        Err(e) => warn!(error = %e, "Failed to flush spans on shutdown"),
    }

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
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
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
