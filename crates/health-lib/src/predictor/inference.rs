//! Model backends
//!
//! - [`OnnxModel`]: a trained classifier loaded through tract-onnx
//! - [`RuleModel`]: deterministic thresholds used when no artifact is
//!   configured

use super::features::{FEATURE_COUNT, FEATURE_NAMES};
use super::output::argmax;
use super::Model;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX classifier taking a `[1, 11]` f32 input and producing one score
/// per class
pub struct OnnxModel {
    plan: TractModel,
    version: String,
}

impl OnnxModel {
    /// Load a model from disk, verifying its SHA-256 digest when given
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;

        let digest = hex::encode(Sha256::digest(&bytes));
        if let Some(expected) = expected_sha256 {
            if !digest.eq_ignore_ascii_case(expected.trim()) {
                anyhow::bail!(
                    "Model artifact {} has sha256 {}, expected {}",
                    path.display(),
                    digest,
                    expected.trim()
                );
            }
        }

        let model = Self::from_bytes(&bytes, format!("onnx-{}", &digest[..12]))?;
        info!(path = %path.display(), version = %model.version, "Loaded ONNX model");
        Ok(model)
    }

    /// Parse and optimize an ONNX model from bytes
    pub fn from_bytes(bytes: &[u8], version: impl Into<String>) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, FEATURE_COUNT]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            plan,
            version: version.into(),
        })
    }
}

impl Model for OnnxModel {
    fn input_width(&self) -> usize {
        FEATURE_COUNT
    }

    fn predict(&self, features: &[f32]) -> Result<i64> {
        let start = Instant::now();

        let input: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, features.len()), features.to_vec())
                .context("Failed to shape model input")?
                .into();
        let result = self.plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;

        let scores = output.to_array_view::<f32>()?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        let class = argmax(&scores).context("Model produced no usable scores")?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow inference");
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, class, "Inference completed");
        }

        Ok(class as i64)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Utilisation (percent) at or above which a resource counts as exhausted
pub const PRESSURE_PCT: f32 = 90.0;
/// Kernel limits below these ask for an increase
pub const MIN_FILE_MAX: f32 = 65536.0;
pub const MIN_MSGMAX: f32 = 8192.0;
/// Kernel settings above these ask for a decrease
pub const MAX_SWAPPINESS: f32 = 80.0;
pub const MAX_TCP_FIN_TIMEOUT: f32 = 120.0;

/// Threshold classifier used when no trained model is configured.
///
/// Rules, first match wins:
/// 1. memory, disk or swap utilisation, or CPU usage, at or above 90% → 3
/// 2. `fs.file-max` below 65536 or `kernel.msgmax` below 8192 → 1
/// 3. `vm.swappiness` at or above 80 or `tcp_fin_timeout` above 120 → 2
/// 4. otherwise → 0
#[derive(Debug, Clone, Default)]
pub struct RuleModel;

impl RuleModel {
    pub const VERSION: &'static str = "rules-v1";

    pub fn new() -> Self {
        Self
    }
}

fn utilisation_pct(used: f32, total: f32) -> f32 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}

impl Model for RuleModel {
    fn input_width(&self) -> usize {
        FEATURE_COUNT
    }

    fn feature_names(&self) -> Option<&[&'static str]> {
        Some(&FEATURE_NAMES)
    }

    fn predict(&self, features: &[f32]) -> Result<i64> {
        let f: &[f32; FEATURE_COUNT] = features
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected {} features, got {}", FEATURE_COUNT, features.len()))?;
        let [total_mem, used_mem, cpu, total_disk, used_disk, total_swap, used_swap, file_max, fin_timeout, msgmax, swappiness] =
            *f;

        let pressure = [
            utilisation_pct(used_mem, total_mem),
            utilisation_pct(used_disk, total_disk),
            utilisation_pct(used_swap, total_swap),
            cpu,
        ];
        if pressure.iter().any(|p| *p >= PRESSURE_PCT) {
            return Ok(3);
        }
        if file_max < MIN_FILE_MAX || msgmax < MIN_MSGMAX {
            return Ok(1);
        }
        if swappiness >= MAX_SWAPPINESS || fin_timeout > MAX_TCP_FIN_TIMEOUT {
            return Ok(2);
        }
        Ok(0)
    }

    fn version(&self) -> &str {
        Self::VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::healthy_sample;
    use crate::predictor::FeatureVector;
    use tempfile::TempDir;

    fn features_of(adjust: impl FnOnce(&mut crate::models::Sample)) -> Vec<f32> {
        let mut sample = healthy_sample();
        adjust(&mut sample);
        FeatureVector::from_sample(&sample).as_slice().to_vec()
    }

    #[test]
    fn test_rule_model_reference_sample_is_healthy() {
        let model = RuleModel::new();
        assert_eq!(model.predict(&features_of(|_| {})).unwrap(), 0);
    }

    #[test]
    fn test_rule_model_resource_pressure() {
        let model = RuleModel::new();
        assert_eq!(model.predict(&features_of(|s| s.used_memory_mb = 15000)).unwrap(), 3);
        assert_eq!(model.predict(&features_of(|s| s.cpu_usage_pct = 97.0)).unwrap(), 3);
        assert_eq!(
            model
                .predict(&features_of(|s| s.used_disk = "48G".parse().unwrap()))
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_rule_model_kernel_rules() {
        let model = RuleModel::new();
        assert_eq!(
            model
                .predict(&features_of(|s| s.kernel_params.file_max = 1024))
                .unwrap(),
            1
        );
        assert_eq!(
            model
                .predict(&features_of(|s| s.kernel_params.swappiness = 90))
                .unwrap(),
            2
        );
        assert_eq!(
            model
                .predict(&features_of(|s| s.kernel_params.tcp_fin_timeout = 300))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_rule_model_zero_swap_is_not_pressure() {
        let model = RuleModel::new();
        let features = features_of(|s| {
            s.total_swap_mb = 0;
            s.used_swap_mb = 0;
        });
        assert_eq!(model.predict(&features).unwrap(), 0);
    }

    #[test]
    fn test_rule_model_rejects_wrong_width() {
        assert!(RuleModel::new().predict(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_onnx_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not really a model").unwrap();

        let err = OnnxModel::load(&path, Some("00")).err().unwrap();
        assert!(err.to_string().contains("sha256"), "{}", err);
    }

    #[test]
    fn test_onnx_rejects_garbage_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not really a model").unwrap();

        assert!(OnnxModel::load(&path, None).is_err());
    }

    #[test]
    fn test_onnx_missing_artifact() {
        let err = OnnxModel::load(Path::new("/nonexistent/model.onnx"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to read model artifact"));
    }
}
