//! Message Controller
//!
//! Registers the Message CRD, then watches Messages and broadcasts each new
//! one exactly once.

use message_client::MessageClient;
use message_controller::bootstrap::ensure_crd;
use message_controller::{shutdown_channel, Controller, ControllerConfig, ControllerError};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Message Controller");

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Resync period: {:?}", config.resync_period);
    info!("  Reconnect backoff: {:?}..{:?}", config.backoff_min, config.backoff_max);
    info!("  Conditional status writes: {}", config.conditional_writes);

    // Create Kubernetes client
    let kube_client = kube::Client::try_default().await?;

    if config.install_crd {
        ensure_crd(kube_client.clone()).await?;
    }

    let client = MessageClient::new(kube_client, config.namespace.as_deref())
        .with_watch_timeout(config.watch_timeout_secs);
    let controller = Controller::new(Arc::new(client), &config);

    let (shutdown_tx, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Failed to listen for Ctrl-C, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown).await?;

    info!("Message Controller stopped");
    Ok(())
}
