//! Core data models for host health analysis

use crate::error::{ErrorKind, SampleViolation};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kernel tunables carried by every sample, in wire order
pub const KERNEL_PARAM_KEYS: [&str; 4] = [
    "fs.file-max",
    "net.ipv4.tcp_fin_timeout",
    "kernel.msgmax",
    "vm.swappiness",
];

/// One point-in-time host snapshot.
///
/// Field names on the wire follow the collector payload
/// (`total_memory`, `cpu_usage`, ...); the Rust names carry the unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "total_memory")]
    pub total_memory_mb: u64,
    #[serde(rename = "used_memory")]
    pub used_memory_mb: u64,
    #[serde(rename = "cpu_usage")]
    pub cpu_usage_pct: f64,
    pub total_disk: DiskCapacity,
    pub used_disk: DiskCapacity,
    #[serde(rename = "total_swap")]
    pub total_swap_mb: u64,
    #[serde(rename = "used_swap")]
    pub used_swap_mb: u64,
    pub kernel_params: KernelParams,
}

impl Sample {
    /// Check field ranges and used/total relations.
    ///
    /// Returns the first violated constraint, checked in wire order.
    pub fn validate(&self) -> Result<(), SampleViolation> {
        if self.used_memory_mb > self.total_memory_mb {
            return Err(SampleViolation::UsedExceedsTotal {
                resource: "memory",
                used: self.used_memory_mb.to_string(),
                total: self.total_memory_mb.to_string(),
            });
        }

        if !self.cpu_usage_pct.is_finite() || !(0.0..=100.0).contains(&self.cpu_usage_pct) {
            return Err(SampleViolation::CpuOutOfRange(self.cpu_usage_pct));
        }

        if self.used_disk.bytes() > self.total_disk.bytes() {
            return Err(SampleViolation::UsedExceedsTotal {
                resource: "disk",
                used: self.used_disk.to_string(),
                total: self.total_disk.to_string(),
            });
        }

        if self.used_swap_mb > self.total_swap_mb {
            return Err(SampleViolation::UsedExceedsTotal {
                resource: "swap",
                used: self.used_swap_mb.to_string(),
                total: self.total_swap_mb.to_string(),
            });
        }

        for (key, value) in self.kernel_params.iter() {
            if value < 0 {
                return Err(SampleViolation::NegativeKernelParam { key, value });
            }
        }

        Ok(())
    }
}

/// The four mandatory kernel tunables. Unknown keys are rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelParams {
    #[serde(rename = "fs.file-max")]
    pub file_max: i64,
    #[serde(rename = "net.ipv4.tcp_fin_timeout")]
    pub tcp_fin_timeout: i64,
    #[serde(rename = "kernel.msgmax")]
    pub msgmax: i64,
    #[serde(rename = "vm.swappiness")]
    pub swappiness: i64,
}

impl KernelParams {
    /// Build from values given in wire order
    pub fn from_values(values: [i64; 4]) -> Self {
        let [file_max, tcp_fin_timeout, msgmax, swappiness] = values;
        Self {
            file_max,
            tcp_fin_timeout,
            msgmax,
            swappiness,
        }
    }

    /// Iterate `(key, value)` pairs in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> {
        KERNEL_PARAM_KEYS.into_iter().zip([
            self.file_max,
            self.tcp_fin_timeout,
            self.msgmax,
            self.swappiness,
        ])
    }
}

/// Binary size units used by `df -h` style capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiskUnit {
    Bytes,
    Kibi,
    Mebi,
    Gibi,
    Tebi,
    Pebi,
}

impl DiskUnit {
    const ALL: [DiskUnit; 6] = [
        DiskUnit::Bytes,
        DiskUnit::Kibi,
        DiskUnit::Mebi,
        DiskUnit::Gibi,
        DiskUnit::Tebi,
        DiskUnit::Pebi,
    ];

    pub fn suffix(self) -> char {
        match self {
            DiskUnit::Bytes => 'B',
            DiskUnit::Kibi => 'K',
            DiskUnit::Mebi => 'M',
            DiskUnit::Gibi => 'G',
            DiskUnit::Tebi => 'T',
            DiskUnit::Pebi => 'P',
        }
    }

    pub fn multiplier(self) -> f64 {
        1024f64.powi(self as i32)
    }

    fn from_suffix(c: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|u| u.suffix() == c.to_ascii_uppercase())
    }
}

/// A disk capacity with a trailing unit character, e.g. `"50G"`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskCapacity {
    magnitude: f64,
    unit: DiskUnit,
}

impl DiskCapacity {
    pub fn new(magnitude: f64, unit: DiskUnit) -> Result<Self, String> {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(format!("capacity magnitude must be a non-negative number, got {}", magnitude));
        }
        Ok(Self { magnitude, unit })
    }

    /// Render a byte count the way `df -h` does: largest unit keeping the
    /// value below 1024, one decimal below 10.
    pub fn from_bytes(bytes: u64) -> Self {
        let mut unit = DiskUnit::Bytes;
        let mut value = bytes as f64;
        for next in DiskUnit::ALL.into_iter().skip(1) {
            if value < 1024.0 {
                break;
            }
            value /= 1024.0;
            unit = next;
        }

        let magnitude = if value < 10.0 && unit != DiskUnit::Bytes {
            (value * 10.0).round() / 10.0
        } else {
            value.round()
        };

        Self { magnitude, unit }
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> DiskUnit {
        self.unit
    }

    pub fn bytes(&self) -> f64 {
        self.magnitude * self.unit.multiplier()
    }

    /// Magnitude normalized to GiB, the unit used for feature extraction
    pub fn gibibytes(&self) -> f64 {
        self.bytes() / DiskUnit::Gibi.multiplier()
    }
}

/// Shortest text that parses back to the same magnitude; `50.0` renders
/// as `"50G"`, `1.25` as `"1.25G"`
impl fmt::Display for DiskCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

impl FromStr for DiskCapacity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let suffix = s
            .chars()
            .last()
            .ok_or_else(|| "capacity is empty".to_string())?;
        let unit = DiskUnit::from_suffix(suffix)
            .ok_or_else(|| format!("capacity {:?} must end with a unit (B, K, M, G, T, P)", s))?;
        let number = &s[..s.len() - suffix.len_utf8()];
        let magnitude: f64 = number
            .parse()
            .map_err(|_| format!("capacity {:?} has no numeric magnitude", s))?;
        Self::new(magnitude, unit)
    }
}

impl Serialize for DiskCapacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DiskCapacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Classifier output returned to the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub predicted_class: u32,
    pub recommendation: String,
}

/// A classified sample waiting to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub sample: Sample,
    pub classification: Classification,
    pub received_at: DateTime<Utc>,
}

/// Persisted analysis fact; `id` is assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub sample: Sample,
    #[serde(flatten)]
    pub classification: Classification,
    pub received_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn from_pending(id: i64, pending: PendingRecord) -> Self {
        Self {
            id,
            sample: pending.sample,
            classification: pending.classification,
            received_at: pending.received_at,
        }
    }
}

/// Error body returned by the analyzer on any non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// The reference sample used across tests
    pub fn healthy_sample() -> Sample {
        Sample {
            total_memory_mb: 16000,
            used_memory_mb: 4000,
            cpu_usage_pct: 12.5,
            total_disk: "50G".parse().unwrap(),
            used_disk: "10G".parse().unwrap(),
            total_swap_mb: 2000,
            used_swap_mb: 0,
            kernel_params: KernelParams {
                file_max: 100000,
                tcp_fin_timeout: 60,
                msgmax: 65536,
                swappiness: 10,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::healthy_sample;
    use super::*;

    const WIRE_SAMPLE: &str = r#"{
        "total_memory": 16000, "used_memory": 4000, "cpu_usage": 12.5,
        "total_disk": "50G", "used_disk": "10G",
        "total_swap": 2000, "used_swap": 0,
        "kernel_params": {
            "fs.file-max": 100000, "net.ipv4.tcp_fin_timeout": 60,
            "kernel.msgmax": 65536, "vm.swappiness": 10
        }
    }"#;

    #[test]
    fn test_decode_wire_sample() {
        let sample: Sample = serde_json::from_str(WIRE_SAMPLE).unwrap();
        assert_eq!(sample, healthy_sample());
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let value = serde_json::to_value(healthy_sample()).unwrap();
        assert_eq!(value["total_memory"], 16000);
        assert_eq!(value["total_disk"], "50G");
        assert_eq!(value["kernel_params"]["vm.swappiness"], 10);
        assert!(value.get("total_memory_mb").is_none());
    }

    #[test]
    fn test_missing_kernel_param_rejected() {
        let raw = WIRE_SAMPLE.replace(r#", "vm.swappiness": 10"#, "");
        let err = serde_json::from_str::<Sample>(&raw).unwrap_err();
        assert!(err.to_string().contains("vm.swappiness"), "{}", err);
    }

    #[test]
    fn test_unknown_kernel_param_rejected() {
        let raw = WIRE_SAMPLE.replace(
            r#""vm.swappiness": 10"#,
            r#""vm.swappiness": 10, "vm.overcommit_memory": 1"#,
        );
        assert!(serde_json::from_str::<Sample>(&raw).is_err());
    }

    #[test]
    fn test_disk_capacity_parsing() {
        let cap: DiskCapacity = "50G".parse().unwrap();
        assert_eq!(cap.magnitude(), 50.0);
        assert_eq!(cap.unit(), DiskUnit::Gibi);
        assert_eq!(cap.gibibytes(), 50.0);

        let cap: DiskCapacity = "1.5T".parse().unwrap();
        assert_eq!(cap.gibibytes(), 1536.0);

        let cap: DiskCapacity = "512m".parse().unwrap();
        assert_eq!(cap.gibibytes(), 0.5);

        assert!("50".parse::<DiskCapacity>().is_err());
        assert!("G".parse::<DiskCapacity>().is_err());
        assert!("-5G".parse::<DiskCapacity>().is_err());
        assert!("".parse::<DiskCapacity>().is_err());
    }

    #[test]
    fn test_disk_capacity_from_bytes() {
        let gib = 1024u64 * 1024 * 1024;
        assert_eq!(DiskCapacity::from_bytes(50 * gib).to_string(), "50G");
        assert_eq!(DiskCapacity::from_bytes(1843 * gib).to_string(), "1.8T");
        assert_eq!(DiskCapacity::from_bytes(512 * 1024 * 1024).to_string(), "512M");
        assert_eq!(DiskCapacity::from_bytes(100).to_string(), "100B");
    }

    #[test]
    fn test_disk_capacity_keeps_submitted_precision() {
        for text in ["1.25G", "0.04G", "1.23456T", "7M"] {
            let cap: DiskCapacity = text.parse().unwrap();
            assert_eq!(cap.to_string(), text);

            let json = serde_json::to_string(&cap).unwrap();
            let back: DiskCapacity = serde_json::from_str(&json).unwrap();
            assert_eq!(back, cap);
        }
    }

    #[test]
    fn test_validate_used_memory_exceeds_total() {
        let mut sample = healthy_sample();
        sample.used_memory_mb = 17000;
        let err = sample.validate().unwrap_err();
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn test_validate_disk_compares_normalized_units() {
        let mut sample = healthy_sample();
        sample.used_disk = "900M".parse().unwrap();
        sample.total_disk = "1G".parse().unwrap();
        assert!(sample.validate().is_ok());

        sample.used_disk = "2048M".parse().unwrap();
        let err = sample.validate().unwrap_err();
        assert!(err.to_string().contains("disk"));
    }

    #[test]
    fn test_validate_swap_and_cpu() {
        let mut sample = healthy_sample();
        sample.used_swap_mb = 2001;
        assert!(sample.validate().unwrap_err().to_string().contains("swap"));

        let mut sample = healthy_sample();
        sample.cpu_usage_pct = 100.5;
        assert!(matches!(
            sample.validate(),
            Err(SampleViolation::CpuOutOfRange(_))
        ));

        sample.cpu_usage_pct = f64::NAN;
        assert!(sample.validate().is_err());
    }

    #[test]
    fn test_validate_reports_first_violation() {
        let mut sample = healthy_sample();
        sample.used_memory_mb = 20000;
        sample.used_swap_mb = 3000;
        let err = sample.validate().unwrap_err();
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn test_record_schema_flattens_classification() {
        let record = AnalysisRecord {
            id: 7,
            sample: healthy_sample(),
            classification: Classification {
                predicted_class: 0,
                recommendation: "No changes needed".to_string(),
            },
            received_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["predicted_class"], 0);
        assert_eq!(value["recommendation"], "No changes needed");
        assert_eq!(value["sample"]["used_disk"], "10G");
        assert!(value["received_at"].is_string());
    }
}
