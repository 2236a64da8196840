use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Serves `router` until Ctrl-C, over TLS when the configuration names a certificate and key.
pub async fn serve(config: &Config, router: Router) -> Result<()> {
    let router = router.layer(TraceLayer::new_for_http());

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let addr: SocketAddr = format!("{}:{}", config.address, config.port)
                .parse()
                .context("Invalid listen address")?;
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .context("Failed to load TLS certificate or key")?;

            let handle = Handle::new();
            tokio::spawn({
                let handle = handle.clone();
                async move {
                    shutdown_signal().await;
                    handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
                }
            });

            info!("Listening on {} (TLS)", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
            info!("Listening on {}", listener.local_addr()?);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
