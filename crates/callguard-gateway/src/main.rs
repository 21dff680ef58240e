//! callguard gateway binary.
//!
//! Startup:
//!
//! 1. Initialize telemetry from the environment
//! 2. Load configuration (`CALLGUARD_CONFIG` plus overrides)
//! 3. Load the access policy
//! 4. Serve until Ctrl+C or SIGTERM, then drain within the grace period

use anyhow::{Context, Result};
use callguard_gateway::{AccessPolicy, GatewayConfig, GatewayService};
use callguard_telemetry::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())?;

    let config = GatewayConfig::load().context("loading configuration")?;

    let policy = match config.acl.policy_json()? {
        Some(blob) => AccessPolicy::from_json(&blob).context("parsing access policy")?,
        None => {
            warn!("No access policy configured; set CALLGUARD_ACL or CALLGUARD_ACL_FILE");
            AccessPolicy::default()
        }
    };
    info!(consumers = policy.consumer_count(), "Access policy loaded");

    let service = GatewayService::new(config, policy)?;
    tokio::spawn(shutdown_on_signal(service.shutdown_token()));

    service.run().await?;
    Ok(())
}

async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
    token.cancel();
}
