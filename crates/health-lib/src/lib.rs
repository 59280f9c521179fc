//! Host health library
//!
//! This crate provides the core functionality for:
//! - Sampling host resources and kernel tunables
//! - Delivering samples to the analysis service over HTTP
//! - Classifying samples behind a pluggable model
//! - Persisting analysis records
//! - Health checks and observability

pub mod analysis;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod store;
pub mod sync;

pub use error::{
    AnalysisError, ClassifyError, CollectError, ErrorKind, SampleViolation, StoreError,
    TransportError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HealthMetrics, StructuredLogger};
