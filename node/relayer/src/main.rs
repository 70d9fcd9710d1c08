use anyhow::Result;
use blindfold_relayer::{
    config::RelayerArgs, health, InferenceClient, OracleContractClient, ProcessorConfig,
    RelayerStatus, RequestProcessor, Scheduler,
};
use clap::Parser;
use ethers::signers::Signer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match RelayerArgs::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting BlindFold relayer");
    info!("Network: {:?} (chain {})", config.network, config.network.chain_id());
    info!("Contract: {:?}", config.contract_address);
    info!("Relayer: {:?}", config.wallet.address());
    info!("Model: {}", config.inference.model);

    let chain = Arc::new(OracleContractClient::new(
        &config.rpc_url,
        config.wallet.clone(),
        config.contract_address,
        config.chain_timeout,
    )?);
    let inference = Arc::new(InferenceClient::new(&config.inference)?);

    let processor = RequestProcessor::new(
        chain.clone(),
        inference,
        ProcessorConfig {
            model: config.inference.model.clone(),
            mark_failed: config.mark_failed,
            fetch_attestation: config.inference.fetch_attestation,
        },
    );

    let status = Arc::new(RelayerStatus::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_status = status.clone();
    let health_shutdown = shutdown_rx.clone();
    let health_port = config.health_port;
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_status, health_shutdown).await {
            error!("health endpoint failed: {}", e);
        }
    });

    let scheduler = Scheduler::new(chain, processor, config.scheduler, status, shutdown_rx);
    let worker = tokio::spawn(async move { scheduler.run().await });

    wait_for_signal().await?;
    warn!("Shutting down, waiting for the current step to finish...");
    let _ = shutdown_tx.send(true);

    worker.await?;
    health_handle.await?;

    info!("Clean exit");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => warn!("Interrupted (Ctrl+C) ..."),
        _ = terminate.recv() => warn!("Got Terminate signal ..."),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    warn!("Interrupted (Ctrl+C) ...");
    Ok(())
}
