//! EgressIPAM Controller
//!
//! Converges the `egressCIDRs` and `egressIPs` of HostSubnet records to the
//! address ranges declared by EgressIPAM policies, and clears the egress
//! state of namespaces that leave a policy.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting EgressIPAM Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!(
        "  Max concurrent writes: {}",
        config
            .max_concurrent_writes
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    info!("  Resync period: {:?}", config.resync);
    info!(
        "  Backoff: {}m..{}m",
        config.backoff_min_minutes, config.backoff_max_minutes
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
