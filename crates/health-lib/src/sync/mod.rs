//! Sample delivery to the analysis service
//!
//! This module provides:
//! - the [`Transport`] seam used by the collection loop
//! - an HTTP client that posts samples to `/analyze` with bounded
//!   retries and exponential backoff

mod client;


pub use client::{AnalyzerClient, AnalyzerClientBuilder, ClientConfig};

use crate::error::TransportError;
use crate::models::{Classification, Sample};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Delivers one sample and returns the analyzer's classification
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `sample`, abandoning any in-flight attempt once `shutdown` fires
    async fn send(
        &self,
        sample: &Sample,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Classification, TransportError>;
}
