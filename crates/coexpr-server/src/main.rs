#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use coexpr::{Pipeline, pool::WorkerPool, source::IpcDirectorySource, stats::Spearman};
use server::config::{CliArgs, ServerConfig};
use server::service::CoExpressionService;
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let pool = WorkerPool::spawn(config.num_workers, Arc::new(Spearman), config.shutdown_timeout)?;
    let source = IpcDirectorySource::new(config.data_dir.clone());
    let pipeline = Pipeline::new(Arc::new(source), Arc::new(pool), config.pipeline.clone())?;
    let service = CoExpressionService::new(pipeline);

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    axum::serve(listener, service.clone().router())
        .with_graceful_shutdown(shutdown_signal(service, providers, config))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting co-expression service on {} with full config: {:#?}",
            _config.server_addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting co-expression service on {} with {} workers, serving {}",
            _config.server_addr,
            _config.num_workers,
            _config.data_dir.display()
        );
    }
}

async fn shutdown_signal(
    service: CoExpressionService<IpcDirectorySource>,
    providers: TelemetryProviders,
    config: ServerConfig,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {}", _e);
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {}", _e);
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // Health flips to NOT_SERVING first, then in-flight streams drain, then
    // the worker pool stops.
    service.shutdown(config.shutdown_timeout).await;

    providers.shutdown();
}
