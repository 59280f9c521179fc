//! Host metric sampling
//!
//! This module reads host state (memory, swap, CPU, disk and kernel
//! tunables) and turns it into one immutable [`Sample`] per collection
//! cycle. OS access sits behind the [`HostReader`] trait; the sampler
//! itself does no network or disk writes.

mod host;
mod r#loop;


pub use host::{read_sysctl, SysinfoReader, DEFAULT_SYSCTL_ROOT};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleOutcome};

use crate::error::CollectError;
use crate::models::{DiskCapacity, KernelParams, Sample, KERNEL_PARAM_KEYS};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Memory and swap accounting, in MiB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub total_swap_mb: u64,
    pub used_swap_mb: u64,
}

/// Capacity of one mounted filesystem, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskReading {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// OS read boundary for the sampler
#[async_trait]
pub trait HostReader: Send + Sync {
    /// Read memory and swap totals and usage
    async fn memory(&self) -> Result<MemoryReading, CollectError>;

    /// Read the instantaneous CPU idle percentage
    async fn cpu_idle_pct(&self) -> Result<f64, CollectError>;

    /// Read capacity for the filesystem mounted at `mount_point`
    async fn disk(&self, mount_point: &Path) -> Result<DiskReading, CollectError>;

    /// Read one kernel tunable by its sysctl name
    async fn kernel_param(&self, key: &'static str) -> Result<i64, CollectError>;
}

/// Produces one [`Sample`] per call from a [`HostReader`]
#[derive(Clone)]
pub struct Sampler {
    reader: Arc<dyn HostReader>,
    mount_point: PathBuf,
}

impl Sampler {
    pub fn new(reader: Arc<dyn HostReader>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            mount_point: mount_point.into(),
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Take one host snapshot.
    ///
    /// Any failed read aborts the call; partial samples are never returned.
    /// CPU usage is point-in-time, not a trend.
    pub async fn collect(&self) -> Result<Sample, CollectError> {
        let start = Instant::now();

        let memory = self.reader.memory().await?;
        if memory.used_memory_mb > memory.total_memory_mb {
            return Err(CollectError::MemoryUnavailable(format!(
                "used memory {}MiB exceeds total {}MiB",
                memory.used_memory_mb, memory.total_memory_mb
            )));
        }
        if memory.used_swap_mb > memory.total_swap_mb {
            return Err(CollectError::MemoryUnavailable(format!(
                "used swap {}MiB exceeds total {}MiB",
                memory.used_swap_mb, memory.total_swap_mb
            )));
        }

        let idle = self.reader.cpu_idle_pct().await?;
        if !idle.is_finite() {
            return Err(CollectError::CpuUnavailable(format!(
                "idle percentage is not a number: {}",
                idle
            )));
        }
        let cpu_usage_pct = (100.0 - idle).clamp(0.0, 100.0);

        let disk = self.reader.disk(&self.mount_point).await?;
        let used_disk_bytes = disk.used_bytes.min(disk.total_bytes);

        let mut values = [0i64; 4];
        for (slot, key) in values.iter_mut().zip(KERNEL_PARAM_KEYS) {
            *slot = self.reader.kernel_param(key).await?;
        }

        debug!(
            elapsed_us = start.elapsed().as_micros() as u64,
            mount_point = %self.mount_point.display(),
            "Host sample collected"
        );

        Ok(Sample {
            total_memory_mb: memory.total_memory_mb,
            used_memory_mb: memory.used_memory_mb,
            cpu_usage_pct,
            total_disk: DiskCapacity::from_bytes(disk.total_bytes),
            used_disk: DiskCapacity::from_bytes(used_disk_bytes),
            total_swap_mb: memory.total_swap_mb,
            used_swap_mb: memory.used_swap_mb,
            kernel_params: KernelParams::from_values(values),
        })
    }
}
