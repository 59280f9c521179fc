//! Host reader backed by sysinfo and the sysctl filesystem
//!
//! Memory, swap, CPU and disk figures come from `sysinfo`; kernel
//! tunables are read from `/proc/sys`, where `net.ipv4.tcp_fin_timeout`
//! lives at `net/ipv4/tcp_fin_timeout`.

use super::{DiskReading, HostReader, MemoryReading};
use crate::error::CollectError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::fs;
use tokio::sync::Mutex;

/// Default root of the sysctl tree
pub const DEFAULT_SYSCTL_ROOT: &str = "/proc/sys";

const MIB: u64 = 1024 * 1024;

/// Reads host state through `sysinfo`
pub struct SysinfoReader {
    system: Mutex<System>,
    sysctl_root: PathBuf,
}

impl SysinfoReader {
    pub fn new() -> Self {
        Self::with_sysctl_root(DEFAULT_SYSCTL_ROOT)
    }

    /// Create a reader with a custom sysctl root (for testing)
    pub fn with_sysctl_root(sysctl_root: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            sysctl_root: sysctl_root.into(),
        }
    }
}

impl Default for SysinfoReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostReader for SysinfoReader {
    async fn memory(&self) -> Result<MemoryReading, CollectError> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();

        let total_memory = sys.total_memory();
        if total_memory == 0 {
            return Err(CollectError::MemoryUnavailable(
                "total memory reported as zero".to_string(),
            ));
        }

        Ok(MemoryReading {
            total_memory_mb: total_memory / MIB,
            used_memory_mb: sys.used_memory().min(total_memory) / MIB,
            total_swap_mb: sys.total_swap() / MIB,
            used_swap_mb: sys.used_swap().min(sys.total_swap()) / MIB,
        })
    }

    async fn cpu_idle_pct(&self) -> Result<f64, CollectError> {
        let mut sys = self.system.lock().await;

        // Usage is a delta between two refreshes
        sys.refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();

        if sys.cpus().is_empty() {
            return Err(CollectError::CpuUnavailable("no cpus reported".to_string()));
        }

        let usage = f64::from(sys.global_cpu_info().cpu_usage());
        Ok((100.0 - usage).clamp(0.0, 100.0))
    }

    async fn disk(&self, mount_point: &Path) -> Result<DiskReading, CollectError> {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == mount_point)
            .ok_or_else(|| CollectError::DiskUnavailable {
                mount_point: mount_point.to_path_buf(),
            })?;

        let total_bytes = disk.total_space();
        Ok(DiskReading {
            total_bytes,
            used_bytes: total_bytes.saturating_sub(disk.available_space()),
        })
    }

    async fn kernel_param(&self, key: &'static str) -> Result<i64, CollectError> {
        read_sysctl(&self.sysctl_root, key).await
    }
}

/// Read one integer tunable from a sysctl tree rooted at `root`
pub async fn read_sysctl(root: &Path, key: &'static str) -> Result<i64, CollectError> {
    let path = root.join(key.replace('.', "/"));
    let content = fs::read_to_string(&path).await.map_err(|e| {
        CollectError::KernelParamUnavailable {
            key,
            reason: format!("{}: {}", path.display(), e),
        }
    })?;

    let value = content.split_whitespace().next().unwrap_or_default();
    value
        .parse()
        .map_err(|_| CollectError::KernelParamUnavailable {
            key,
            reason: format!("{:?} is not an integer", content.trim()),
        })
}
