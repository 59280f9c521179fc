//! Health analyzer binary

use anyhow::{Context, Result};
use health_analyzer::{api, config::AnalyzerConfig};
use health_lib::{
    analysis::AnalysisService,
    health::{components, HealthRegistry},
    observability::{HealthMetrics, StructuredLogger},
    predictor::Classifier,
    store::SqliteStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AnalyzerConfig::load()?;

    let health_registry = HealthRegistry::new();

    let classifier = Classifier::new(config.model()?);
    classifier
        .check_layout()
        .context("Model does not match the sample feature layout")?;
    health_registry.register(components::CLASSIFIER).await;
    HealthMetrics::new().set_model_version(classifier.model_version());

    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open record store {}",
            config.database_path.display()
        )
    })?;
    health_registry.register(components::STORE).await;

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_analyzer_startup(
        ANALYZER_VERSION,
        classifier.model_version(),
        &config.database_path.display().to_string(),
    );

    let service = AnalysisService::new(
        classifier,
        Arc::new(store),
        config.analysis_config(),
        health_registry.clone(),
        logger,
    );
    let state = Arc::new(api::AppState::new(service, health_registry.clone()));

    health_registry.set_ready(true).await;

    api::serve(config.listen_port, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("SIGINT received, draining requests");
    })
    .await?;

    info!("Shutdown complete");
    Ok(())
}
