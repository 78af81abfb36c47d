//! PXE Boot Server
//!
//! Serves iPXE binaries over TFTP and HTTP to machines an admission backend
//! allows to PXE boot.
//!
//! Configuration comes from environment variables (see [`config`]); the
//! admission backend is either a static hardware file or NetBox.

mod config;
mod error;

use crate::config::{BackendConfig, Config, LogFormat};
use anyhow::{Context, Result};
use hardware_backend::{FileBackend, NetBoxBackend};
use pxe_server::{AdmissionBackend, BootFiles, PxeServer, ShutdownCause};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config.log_level, config.log_format);

    info!("Starting PXE Boot Server");
    info!("Configuration:");
    info!("  TFTP: {}", config.server.tftp.addr);
    info!("  HTTP: {}", config.server.http.addr);
    info!("  Boot files: {}", config.binary_dir.display());
    info!("  Backend: {:?}", config.backend);

    let files = BootFiles::from_dir(&config.binary_dir)
        .with_context(|| format!("loading boot files from {}", config.binary_dir.display()))?;
    let backend = build_backend(&config.backend).await?;

    let server = PxeServer::new(backend, Arc::new(files), config.server);
    match server.serve(shutdown_signal()).await {
        Ok(cause) => {
            info!(%cause, "PXE Boot Server stopped");
            Ok(())
        }
        Err(e) => {
            error!(protocol = %e.protocol(), "PXE Boot Server failed: {}", e);
            Err(e.into())
        }
    }
}

/// `RUST_LOG` wins over `IPXE_LOG_LEVEL`.
///
/// The OpenTelemetry layer gives spans their OpenTelemetry identity, so TFTP
/// transfers carrying a client traceparent become children of the client's
/// span. No exporter is configured.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let tracer = SdkTracerProvider::builder().build().tracer("pxe-boot");
    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(fmt_layer)
        .init();
}

async fn build_backend(config: &BackendConfig) -> Result<Arc<dyn AdmissionBackend>> {
    match config {
        BackendConfig::File { path } => {
            let backend = FileBackend::from_path(path)?;
            info!(records = backend.len(), "Using hardware file backend");
            Ok(Arc::new(backend))
        }
        BackendConfig::NetBox { url, token } => {
            let backend = NetBoxBackend::new(url.clone(), token.clone())?;
            backend
                .validate_token()
                .await
                .with_context(|| format!("cannot use NetBox at {url}"))?;
            info!(url = %backend.base_url(), "Using NetBox backend");
            Ok(Arc::new(backend))
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> ShutdownCause {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
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
        () = ctrl_c => {
            info!("Received Ctrl+C");
            ShutdownCause::Interrupt
        }
        () = terminate => {
            info!("Received SIGTERM");
            ShutdownCause::Terminate
        }
    }
}
