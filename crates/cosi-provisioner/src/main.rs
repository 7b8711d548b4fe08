//! ObjectScale COSI provisioner binary

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use cosi_common::telemetry::init_telemetry;
use cosi_gateway::{IamClient, S3Client};
use cosi_provisioner::server::serve;
use cosi_provisioner::{Cli, ProvisioningEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(cli.telemetry_config())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let appliance = cli.appliance_config();
    appliance
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid appliance configuration: {}", e))?;
    let settings = cli.engine_settings(&appliance)?;

    info!(
        endpoint = %settings.endpoint,
        region = %settings.default_region,
        policy_arn = %settings.policy_arn,
        "Connecting to ObjectScale"
    );

    let iam = Arc::new(IamClient::new(&appliance)?);
    let s3 = Arc::new(S3Client::new(&appliance)?);
    let engine = ProvisioningEngine::new(iam, s3, settings);

    serve(&cli.listen, engine, &cli.provisioner_name, shutdown_signal()).await?;

    info!("Provisioner stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
