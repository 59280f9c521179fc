//! Analysis pipeline tests with stub models and stores
//!
//! These tests verify:
//! - The reference sample is classified and stored exactly once
//! - Invalid samples never reach the classifier
//! - Classifier failures and timeouts store nothing
//! - Storage failures are distinguished from classifier failures
//! - Stalled classifier calls cannot occupy more than their slots

use super::*;
use crate::error::ErrorKind;
use crate::health::ComponentStatus;
use crate::models::fixtures::healthy_sample;
use crate::predictor::{Model, FEATURE_COUNT};
use crate::store::{MemoryStore, RecordFilter, SqliteStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Model returning a fixed class and counting invocations
struct CountingModel {
    class: i64,
    calls: Arc<AtomicUsize>,
}

impl Model for CountingModel {
    fn input_width(&self) -> usize {
        FEATURE_COUNT
    }

    fn predict(&self, _features: &[f32]) -> anyhow::Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.class)
    }

    fn version(&self) -> &str {
        "counting"
    }
}

struct FailingModel;

impl Model for FailingModel {
    fn input_width(&self) -> usize {
        FEATURE_COUNT
    }

    fn predict(&self, _features: &[f32]) -> anyhow::Result<i64> {
        anyhow::bail!("inference backend crashed")
    }

    fn version(&self) -> &str {
        "failing"
    }
}

struct StalledModel {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StalledModel {
    fn new(delay: Duration) -> (Arc<dyn Model>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(Self {
            delay,
            calls: calls.clone(),
        });
        (model, calls)
    }
}

impl Model for StalledModel {
    fn input_width(&self) -> usize {
        FEATURE_COUNT
    }

    fn predict(&self, _features: &[f32]) -> anyhow::Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(0)
    }

    fn version(&self) -> &str {
        "stalled"
    }
}

/// File-backed store whose inserts abort inside SQLite
fn rejecting_store(dir: &TempDir) -> SqliteStore {
    let path = dir.path().join("records.db");
    let store = SqliteStore::open(&path).unwrap();
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_inserts BEFORE INSERT ON analysis_records \
             BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
        )
        .unwrap();
    store
}

fn test_config() -> AnalysisConfig {
    AnalysisConfig {
        classifier_timeout: Duration::from_millis(100),
        ..Default::default()
    }
}

fn service(model: Arc<dyn Model>, store: Arc<dyn RecordStore>) -> (AnalysisService, HealthRegistry) {
    service_with(model, store, test_config())
}

fn service_with(
    model: Arc<dyn Model>,
    store: Arc<dyn RecordStore>,
    config: AnalysisConfig,
) -> (AnalysisService, HealthRegistry) {
    let health = HealthRegistry::new();
    let service = AnalysisService::new(
        Classifier::new(model),
        store,
        config,
        health.clone(),
        StructuredLogger::new("test-analyzer"),
    );
    (service, health)
}

fn counting(class: i64) -> (Arc<dyn Model>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(CountingModel {
        class,
        calls: calls.clone(),
    });
    (model, calls)
}

#[tokio::test]
async fn test_reference_sample_classified_and_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let (model, _) = counting(0);
    let (service, _) = service(model, store.clone());

    let before = Utc::now();
    let classification = service.analyze(healthy_sample()).await.unwrap();

    assert_eq!(classification.predicted_class, 0);
    assert_eq!(classification.recommendation, "No changes needed");

    let records = store.list(&RecordFilter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sample, healthy_sample());
    assert_eq!(records[0].classification, classification);
    assert!(records[0].received_at >= before);
}

#[tokio::test]
async fn test_each_call_gets_a_greater_id() {
    let store = Arc::new(MemoryStore::new());
    let (model, _) = counting(1);
    let (service, _) = service(model, store.clone());

    for _ in 0..3 {
        service.analyze(healthy_sample()).await.unwrap();
    }

    let ids: Vec<i64> = store
        .list(&RecordFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn test_invalid_sample_never_reaches_classifier() {
    let store = Arc::new(MemoryStore::new());
    let (model, calls) = counting(0);
    let (service, _) = service(model, store.clone());

    let mut sample = healthy_sample();
    sample.used_memory_mb = sample.total_memory_mb + 1;
    let err = service.analyze(sample).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSample);
    assert!(err.to_string().contains("memory"));

    let mut sample = healthy_sample();
    sample.used_disk = "60G".parse().unwrap();
    let err = service.analyze(sample).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSample);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_classifier_failure_stores_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (service, health) = service(Arc::new(FailingModel), store.clone());

    let err = service.analyze(healthy_sample()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClassificationUnavailable);
    assert!(store.is_empty().await);
    let classifier = health.component(components::CLASSIFIER).await.unwrap();
    assert_eq!(classifier.status, ComponentStatus::Degraded);
}

#[tokio::test]
async fn test_stalled_classifier_times_out() {
    let store = Arc::new(MemoryStore::new());
    let (model, _) = StalledModel::new(Duration::from_millis(400));
    let (service, _) = service(model, store.clone());

    let started = Instant::now();
    let err = service.analyze(healthy_sample()).await.unwrap_err();

    assert!(matches!(err, AnalysisError::UpstreamTimeout(_)));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_timed_out_call_keeps_its_slot() {
    let store = Arc::new(MemoryStore::new());
    let (model, calls) = StalledModel::new(Duration::from_millis(600));
    let (service, _) = service_with(
        model,
        store.clone(),
        AnalysisConfig {
            max_concurrent_classifications: 1,
            ..test_config()
        },
    );

    let first = service.analyze(healthy_sample()).await.unwrap_err();
    let second = service.analyze(healthy_sample()).await.unwrap_err();

    assert!(matches!(first, AnalysisError::UpstreamTimeout(_)));
    assert!(matches!(second, AnalysisError::UpstreamTimeout(_)));
    // The second call never got a slot, so the model ran once
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_unknown_class_surfaced() {
    let store = Arc::new(MemoryStore::new());
    let (model, _) = counting(7);
    let (service, _) = service(model, store.clone());

    let err = service.analyze(healthy_sample()).await.unwrap_err();

    assert!(matches!(err, AnalysisError::UnknownClass(7)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_is_persistence_failed() {
    let dir = TempDir::new().unwrap();
    let store = rejecting_store(&dir);
    let (model, calls) = counting(3);
    let (service, health) = service(model, Arc::new(store.clone()));

    let err = service.analyze(healthy_sample()).await.unwrap_err();

    match &err {
        AnalysisError::PersistenceFailed {
            classification,
            reason,
        } => {
            assert_eq!(classification.predicted_class, 3);
            assert!(reason.contains("read-only"), "{}", reason);
        }
        other => panic!("expected PersistenceFailed, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::PersistenceFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.list(&RecordFilter::default()).await.unwrap().is_empty());

    let store_health = health.component(components::STORE).await.unwrap();
    assert_eq!(store_health.status, ComponentStatus::Degraded);
}

#[tokio::test]
async fn test_concurrent_analyses_each_store_one_record() {
    let store = Arc::new(MemoryStore::new());
    let (model, _) = counting(0);
    let (service, _) = service(model, store.clone());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.analyze(healthy_sample()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.len().await, 10);
}

#[tokio::test]
async fn test_malformed_payload_is_invalid_sample() {
    let store = Arc::new(MemoryStore::new());
    let (model, calls) = counting(0);
    let (service, _) = service(model, store.clone());

    let err = service.analyze_payload(b"{\"total_memory\": ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSample);

    let payload = serde_json::to_vec(&healthy_sample()).unwrap();
    let classification = service.analyze_payload(&payload).await.unwrap();
    assert_eq!(classification.predicted_class, 0);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.len().await, 1);
}
