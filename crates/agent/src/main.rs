//! Host agent binary
//!
//! Runs one collection loop for the local host until SIGINT.

use anyhow::{Context, Result};
use health_lib::{
    collector::{CollectionLoopBuilder, Sampler, SysinfoReader},
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    sync::AnalyzerClient,
};
use host_agent::{api, config::AgentConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        mount_point = %config.mount_point.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::TRANSPORT).await;

    let logger = StructuredLogger::new(&config.node_name);

    let reader = Arc::new(SysinfoReader::with_sysctl_root(&config.procfs_sys_root));
    let sampler = Sampler::new(reader, &config.mount_point);
    let client = AnalyzerClient::new(config.client_config())
        .context("Failed to create analyzer client")?;
    let collection_config = config.collection_config();

    let collection = CollectionLoopBuilder::new()
        .sampler(sampler)
        .transport(Arc::new(client))
        .health_registry(health_registry.clone())
        .logger(logger.clone())
        .interval(collection_config.interval)
        .jitter(collection_config.jitter)
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let loop_handle = tokio::spawn(collection.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;
    logger.log_startup(AGENT_VERSION, &config.analyzer_endpoint);

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
