//! Feature extraction for classification
//!
//! Maps a [`Sample`] to the fixed 11-entry feature layout the model was
//! trained on. Disk capacities are normalized to GiB with the unit
//! stripped, so `"50G"` becomes `50.0`.

use crate::models::Sample;

/// Feature order expected by every model backend
pub const FEATURE_NAMES: [&str; 11] = [
    "total_memory",
    "used_memory",
    "cpu_usage",
    "total_disk",
    "used_disk",
    "total_swap",
    "used_swap",
    "fs.file-max",
    "net.ipv4.tcp_fin_timeout",
    "kernel.msgmax",
    "vm.swappiness",
];

/// Number of input features expected by the model
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Model input for one sample, in [`FEATURE_NAMES`] order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn from_sample(sample: &Sample) -> Self {
        let kp = &sample.kernel_params;
        Self([
            sample.total_memory_mb as f32,
            sample.used_memory_mb as f32,
            sample.cpu_usage_pct as f32,
            sample.total_disk.gibibytes() as f32,
            sample.used_disk.gibibytes() as f32,
            sample.total_swap_mb as f32,
            sample.used_swap_mb as f32,
            kp.file_max as f32,
            kp.tcp_fin_timeout as f32,
            kp.msgmax as f32,
            kp.swappiness as f32,
        ])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Look up one feature by name
    pub fn get(&self, name: &str) -> Option<f32> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::healthy_sample;

    #[test]
    fn test_feature_order() {
        let features = FeatureVector::from_sample(&healthy_sample());
        assert_eq!(
            features.as_slice(),
            &[16000.0, 4000.0, 12.5, 50.0, 10.0, 2000.0, 0.0, 100000.0, 60.0, 65536.0, 10.0]
        );
    }

    #[test]
    fn test_disk_normalized_to_gibibytes() {
        let mut sample = healthy_sample();
        sample.total_disk = "2T".parse().unwrap();
        sample.used_disk = "512M".parse().unwrap();

        let features = FeatureVector::from_sample(&sample);
        assert_eq!(features.get("total_disk"), Some(2048.0));
        assert_eq!(features.get("used_disk"), Some(0.5));
        assert_eq!(features.get("no_such_feature"), None);
    }
}
