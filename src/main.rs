//! imgvault server binary.
//!
//! Accepts image uploads over multipart HTTP, stores them under randomized
//! names in a single directory, and serves them back by name.

mod app;
mod config;
mod copy;
mod error;
mod etag;
mod filename;
mod http;
mod images;
mod logging;
mod pending;
mod spool;
mod status;
mod storage;
mod upload;

#[cfg(test)]
mod test_support;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{AppConfig, Args, SHUTDOWN_GRACE};
use crate::storage::ImageStore;

shadow!(build);

/// Starts the image server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let env_file = config::load_env_file();
    let args = Args::parse();
    let config = Arc::new(AppConfig::from_args(args)?);
    logging::init_logging(&config);
    if let Some(path) = env_file {
        debug!(path = %path.display(), "loaded environment file");
    }

    let store = Arc::new(ImageStore::new(config.upload_dir.clone()));
    if let Err(err) = store.ensure_root().await {
        error!(dir = %config.upload_dir.display(), "failed to create upload directory: {err}");
        return Err(err);
    }

    info!(upload_dir = %store.root_path().display(), "upload directory ready");

    let shutdown = CancellationToken::new();
    let addr = SocketAddr::new(config.host, config.port);
    let app = app::build_router(config.clone(), store, shutdown.clone());
    let handle = Handle::new();

    info!(
        env = %config.app_env,
        "🚀 Starting HTTP server at {}",
        addr
    );

    tokio::spawn(shutdown_signal(handle.clone(), shutdown));
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
