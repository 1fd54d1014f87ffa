//! cloud-aln
//!
//! Serves the reference and read shards over HTTP, runs the alignment on a
//! fleet of freshly provisioned nodes and exits with the fleet's aggregate
//! status.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudaln_machine::{DockerMachine, MachineLifecycle, Provisioner};
use cloudaln_server::coordinator::INTERRUPTED_STATUS;
use cloudaln_server::{http, Cli, Config, Coordinator, FileServerState, WorkloadScript};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .init();

    let config = Config::from_cli(cli)?;

    info!(
        driver = config.driver.name(),
        max_nodes = config.max_nodes,
        shards = config.reads.len(),
        image = %config.image,
        "Starting cloud-aln"
    );

    // File server
    let file_state = FileServerState::new(
        config.reference.clone(),
        config.reads.clone(),
        config.credentials.as_ref(),
    );
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        bind = %config.bind_address,
        advertised = %config.socket_address,
        auth = config.credentials.is_some(),
        "File server listening"
    );
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(http::serve(listener, file_state, shutdown.clone()));

    // Fleet
    let tool = Arc::new(DockerMachine::new(config.fleet_tool.clone()));
    let provisioner = Provisioner::new(tool, config.driver.clone());
    let lifecycle = MachineLifecycle::new(provisioner).with_request_timeout(config.request_timeout);
    let workload =
        WorkloadScript::new(&config.socket_address).with_credentials(config.credentials.clone());
    let coordinator = Coordinator::new(Arc::new(lifecycle), Arc::new(workload), config.image.clone());

    // First Ctrl-C cleans up, a second one exits immediately.
    let interrupt = coordinator.cancel_token();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt.is_cancelled() {
                error!("Received second Ctrl-C, exiting without cleanup");
                std::process::exit(INTERRUPTED_STATUS);
            }
            warn!("Received Ctrl-C, cleaning up (press again to force exit)");
            interrupt.cancel();
        }
    });

    let result = coordinator.run(config.max_nodes, config.reads.len()).await?;

    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => error!(error = %e, "File server error"),
        Err(e) => error!(error = %e, "File server task failed"),
        Ok(Ok(())) => {}
    }

    info!(?result, "cloud-aln finished");
    std::process::exit(result.exit_status());
}
