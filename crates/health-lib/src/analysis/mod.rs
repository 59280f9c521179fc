//! Analysis service
//!
//! Validates an incoming sample, classifies it under a deadline and
//! stores the result before answering. Every accepted call produces
//! exactly one new record; identical samples are not deduplicated.

#[cfg(test)]
mod tests;

use crate::error::AnalysisError;
use crate::health::{components, HealthRegistry};
use crate::models::{Classification, PendingRecord, Sample};
use crate::observability::{HealthMetrics, StructuredLogger};
use crate::predictor::Classifier;
use crate::store::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Default deadline for one classifier call
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of model invocations allowed to run at once
pub const DEFAULT_MAX_CONCURRENT_CLASSIFICATIONS: usize = 16;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Upper bound on a single model invocation, including the wait for
    /// a free classifier slot
    pub classifier_timeout: Duration,
    /// Blocking threads the model may occupy at once. A call that timed
    /// out keeps its slot until the model returns.
    pub max_concurrent_classifications: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT,
            max_concurrent_classifications: DEFAULT_MAX_CONCURRENT_CLASSIFICATIONS,
        }
    }
}

/// Sample → classification → record pipeline, safe to share across requests
#[derive(Clone)]
pub struct AnalysisService {
    classifier: Classifier,
    store: Arc<dyn RecordStore>,
    config: AnalysisConfig,
    classifier_slots: Arc<Semaphore>,
    health: HealthRegistry,
    metrics: HealthMetrics,
    logger: StructuredLogger,
}

impl AnalysisService {
    pub fn new(
        classifier: Classifier,
        store: Arc<dyn RecordStore>,
        config: AnalysisConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        let slots = config.max_concurrent_classifications.max(1);
        let classifier_slots = Arc::new(Semaphore::new(slots));
        Self {
            classifier,
            store,
            config,
            classifier_slots,
            health,
            metrics: HealthMetrics::new(),
            logger,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn model_version(&self) -> &str {
        self.classifier.model_version()
    }

    /// Classify `sample` and persist the result.
    ///
    /// No record is written unless classification succeeded. A storage
    /// failure after classification returns `PersistenceFailed` carrying
    /// the unconfirmed classification.
    pub async fn analyze(&self, sample: Sample) -> Result<Classification, AnalysisError> {
        let received_at = Utc::now();

        match self.run(sample, received_at).await {
            Ok(classification) => Ok(classification),
            Err(err) => {
                self.record_failure(&err).await;
                Err(err)
            }
        }
    }

    /// Decode a wire payload and analyze it; a payload that does not
    /// decode is an invalid sample
    pub async fn analyze_payload(&self, body: &[u8]) -> Result<Classification, AnalysisError> {
        match serde_json::from_slice::<Sample>(body) {
            Ok(sample) => self.analyze(sample).await,
            Err(e) => {
                let err = AnalysisError::InvalidSample(format!("malformed sample: {}", e));
                self.record_failure(&err).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        sample: Sample,
        received_at: chrono::DateTime<Utc>,
    ) -> Result<Classification, AnalysisError> {
        sample.validate()?;

        let (sample, classification) = self.classify(sample).await?;
        self.health.set_healthy(components::CLASSIFIER).await;

        let cpu_usage_pct = sample.cpu_usage_pct;
        let pending = PendingRecord {
            sample,
            classification: classification.clone(),
            received_at,
        };

        let id = self.store.insert(pending).await.map_err(|e| {
            AnalysisError::PersistenceFailed {
                classification: classification.clone(),
                reason: e.to_string(),
            }
        })?;
        self.health.set_healthy(components::STORE).await;

        self.metrics.inc_records_stored();
        self.metrics.inc_analyses(classification.predicted_class);
        self.logger
            .log_sample_classified(id, classification.predicted_class, cpu_usage_pct);

        Ok(classification)
    }

    /// Run the model on the blocking pool under the configured deadline
    async fn classify(&self, sample: Sample) -> Result<(Sample, Classification), AnalysisError> {
        let classifier = self.classifier.clone();
        let slots = Arc::clone(&self.classifier_slots);
        let timeout = self.config.classifier_timeout;
        let start = Instant::now();

        let task = async move {
            let permit = slots.acquire_owned().await.map_err(|e| {
                AnalysisError::ClassificationUnavailable(format!("classifier slots closed: {}", e))
            })?;

            tokio::task::spawn_blocking(move || {
                // Released when the model returns, not when the caller gives up
                let _permit = permit;
                let result = classifier.classify(&sample);
                (sample, result)
            })
            .await
            .map_err(|e| {
                AnalysisError::ClassificationUnavailable(format!("classifier task failed: {}", e))
            })
        };

        let (sample, result) = match tokio::time::timeout(timeout, task).await {
            Ok(outcome) => outcome?,
            // A started blocking task keeps running; its result is discarded
            Err(_) => return Err(AnalysisError::UpstreamTimeout(timeout)),
        };

        let elapsed = start.elapsed();
        self.metrics
            .observe_classification_latency(elapsed.as_secs_f64());
        debug!(elapsed_us = elapsed.as_micros() as u64, "Classifier returned");

        Ok((sample, result?))
    }

    async fn record_failure(&self, err: &AnalysisError) {
        let kind = err.kind();
        self.metrics.inc_analysis_errors(kind);
        self.logger.log_analysis_failure(kind, &err.to_string());

        match err {
            AnalysisError::ClassificationUnavailable(_) | AnalysisError::UpstreamTimeout(_) => {
                self.health
                    .set_degraded(components::CLASSIFIER, err.to_string())
                    .await;
            }
            AnalysisError::PersistenceFailed { .. } => {
                self.health
                    .set_degraded(components::STORE, err.to_string())
                    .await;
            }
            _ => {}
        }
    }
}
