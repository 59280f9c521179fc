//! Error taxonomy shared by the collector and the analyzer

use crate::models::Classification;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable error kind carried in analyzer error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CollectionFailure,
    TransportFailure,
    InvalidSample,
    RejectedSample,
    ClassificationUnavailable,
    UpstreamTimeout,
    PersistenceFailed,
    UnknownClass,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CollectionFailure => "collection_failure",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::InvalidSample => "invalid_sample",
            ErrorKind::RejectedSample => "rejected_sample",
            ErrorKind::ClassificationUnavailable => "classification_unavailable",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::PersistenceFailed => "persistence_failed",
            ErrorKind::UnknownClass => "unknown_class",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host read failures; any of these aborts the whole collection cycle
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("memory accounting unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("cpu snapshot unavailable: {0}")]
    CpuUnavailable(String),

    #[error("no filesystem mounted at {}", .mount_point.display())]
    DiskUnavailable { mount_point: PathBuf },

    #[error("kernel parameter {key} unavailable: {reason}")]
    KernelParamUnavailable { key: &'static str, reason: String },
}

/// Constraint violated by an incoming sample
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleViolation {
    #[error("used {resource} ({used}) exceeds total {resource} ({total})")]
    UsedExceedsTotal {
        resource: &'static str,
        used: String,
        total: String,
    },

    #[error("cpu_usage must be within [0, 100], got {0}")]
    CpuOutOfRange(f64),

    #[error("kernel parameter {key} must be non-negative, got {value}")]
    NegativeKernelParam { key: &'static str, value: i64 },
}

/// Classifier adapter failures
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification unavailable: {0}")]
    Unavailable(String),

    #[error("model returned class {0}, outside the recommendation table")]
    UnknownClass(i64),
}

/// Record store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("stored record {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures surfaced by the analysis service, one per error kind
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("classifier did not answer within {}ms", .0.as_millis())]
    UpstreamTimeout(Duration),

    #[error("model returned class {0}, outside the recommendation table")]
    UnknownClass(i64),

    /// Classification succeeded but the record was not stored
    #[error("persistence failed: {reason}")]
    PersistenceFailed {
        classification: Classification,
        reason: String,
    },
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InvalidSample(_) => ErrorKind::InvalidSample,
            AnalysisError::ClassificationUnavailable(_) => ErrorKind::ClassificationUnavailable,
            AnalysisError::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            AnalysisError::UnknownClass(_) => ErrorKind::UnknownClass,
            AnalysisError::PersistenceFailed { .. } => ErrorKind::PersistenceFailed,
        }
    }
}

impl From<SampleViolation> for AnalysisError {
    fn from(violation: SampleViolation) -> Self {
        AnalysisError::InvalidSample(violation.to_string())
    }
}

impl From<ClassifyError> for AnalysisError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Unavailable(reason) => AnalysisError::ClassificationUnavailable(reason),
            ClassifyError::UnknownClass(class) => AnalysisError::UnknownClass(class),
        }
    }
}

/// Sample delivery failures seen by the collector
#[derive(Debug, Error)]
pub enum TransportError {
    /// Retries exhausted on transient failures
    #[error("delivery failed after {attempts} attempt(s): {reason}")]
    Failure { attempts: u32, reason: String },

    /// The analyzer refused the payload; never retried
    #[error("analyzer rejected sample ({status}): {message}")]
    RejectedSample {
        status: u16,
        code: Option<ErrorKind>,
        message: String,
    },

    #[error("delivery cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("invalid analyzer endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::RejectedSample { .. } => ErrorKind::RejectedSample,
            _ => ErrorKind::TransportFailure,
        }
    }
}
