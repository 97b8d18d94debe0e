//! ldapgate server entry point.

use std::sync::Arc;

use anyhow::Context;
use ldapgate::{cors_layer, init_tracing, router};
use ldapgate_core::{GatewayConfig, RequestPipeline};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal in production.
    let dotenv = dotenvy::dotenv();

    init_tracing()?;

    if let Ok(path) = &dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let GatewayConfig {
        http,
        directory,
        mail,
    } = GatewayConfig::from_env().context("invalid configuration")?;

    info!(
        directory = %directory.url(),
        relay = %mail.host,
        relay_port = mail.port,
        "Starting ldapgate"
    );

    let cors = cors_layer(&http.allowed_origins).context("invalid CORS_ALLOWED_ORIGINS")?;
    let pipeline = Arc::new(RequestPipeline::from_config(directory, mail));

    let listener = TcpListener::bind(http.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", http.bind_address))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(pipeline, cors))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
