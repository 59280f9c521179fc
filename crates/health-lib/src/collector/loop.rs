//! Collection loop
//!
//! Runs one sample → send cycle per tick with configurable interval and
//! jitter. A failed cycle is logged and skipped; the next cycle starts
//! from scratch.

use super::Sampler;
use crate::health::{components, HealthRegistry};
use crate::observability::{HealthMetrics, StructuredLogger};
use crate::sync::Transport;
use crate::error::TransportError;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Base collection interval (default: 60 seconds)
    pub interval: Duration,
    /// Maximum random delay added before each cycle (default: 2 seconds)
    pub jitter: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter: Duration::from_secs(2),
        }
    }
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sample classified by the analyzer
    Delivered { predicted_class: u32 },
    /// Host read failed; nothing was sent
    CollectionFailed,
    /// Sample collected but not delivered
    DeliveryFailed,
    /// Shutdown arrived mid-cycle
    Cancelled,
}

/// Periodic sample → send pipeline for one host
pub struct CollectionLoop {
    sampler: Sampler,
    transport: Arc<dyn Transport>,
    config: CollectionConfig,
    health: HealthRegistry,
    metrics: HealthMetrics,
    logger: StructuredLogger,
}

impl CollectionLoop {
    pub fn new(
        sampler: Sampler,
        transport: Arc<dyn Transport>,
        config: CollectionConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            sampler,
            transport,
            config,
            health,
            metrics: HealthMetrics::new(),
            logger,
        }
    }

    /// Run cycles until the shutdown channel fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            mount_point = %self.sampler.mount_point().display(),
            "Starting collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let jitter = Duration::from_millis(rand_jitter(self.config.jitter.as_millis() as u64));
                    tokio::select! {
                        _ = tokio::time::sleep(jitter) => {}
                        _ = shutdown.recv() => break,
                    }

                    if self.run_cycle(&mut shutdown).await == CycleOutcome::Cancelled {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Shutting down collection loop");
    }

    /// Collect one sample and deliver it
    pub async fn run_cycle(&self, shutdown: &mut broadcast::Receiver<()>) -> CycleOutcome {
        let start = Instant::now();

        let sample = match self.sampler.collect().await {
            Ok(sample) => sample,
            Err(e) => {
                self.metrics.inc_collection_errors();
                self.health
                    .set_degraded(components::SAMPLER, e.to_string())
                    .await;
                self.logger.log_cycle_failure("collect", &e.to_string());
                return CycleOutcome::CollectionFailed;
            }
        };
        self.metrics
            .observe_collection_latency(start.elapsed().as_secs_f64());
        self.health.set_healthy(components::SAMPLER).await;

        let send_start = Instant::now();
        match self.transport.send(&sample, shutdown).await {
            Ok(classification) => {
                self.metrics
                    .observe_send_latency(send_start.elapsed().as_secs_f64());
                self.metrics.inc_samples_sent();
                self.health.set_healthy(components::TRANSPORT).await;
                self.logger.log_sample_sent(
                    classification.predicted_class,
                    &classification.recommendation,
                    send_start.elapsed(),
                );
                CycleOutcome::Delivered {
                    predicted_class: classification.predicted_class,
                }
            }
            Err(TransportError::Cancelled { attempts }) => {
                debug!(attempts, "Delivery abandoned on shutdown");
                self.metrics.inc_send_failures();
                CycleOutcome::Cancelled
            }
            Err(e) => {
                // The sample is dropped; there is no cross-cycle buffer
                self.metrics.inc_send_failures();
                self.health
                    .set_degraded(components::TRANSPORT, e.to_string())
                    .await;
                self.logger.log_cycle_failure("send", &e.to_string());
                CycleOutcome::DeliveryFailed
            }
        }
    }
}

/// Generate a pseudo-random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for the collection loop
pub struct CollectionLoopBuilder {
    sampler: Option<Sampler>,
    transport: Option<Arc<dyn Transport>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            transport: None,
            health: None,
            logger: None,
            config: CollectionConfig::default(),
        }
    }

    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("Transport is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be greater than zero");
        }

        Ok(CollectionLoop::new(
            sampler,
            transport,
            self.config,
            self.health.unwrap_or_default(),
            self.logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
        ))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
