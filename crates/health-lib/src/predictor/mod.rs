//! Classifier adapter
//!
//! Wraps an opaque model behind `classify(Sample) -> Classification`.
//! The analysis service only sees [`Classifier`]; backends implement
//! [`Model`].

mod features;
mod inference;
mod output;

pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use inference::{OnnxModel, RuleModel};
pub use output::{argmax, recommendation_for, RECOMMENDATIONS};

use crate::error::ClassifyError;
use crate::models::{Classification, Sample};
use anyhow::Result;
use std::sync::Arc;

/// A predictive model mapping a feature vector to a class index.
///
/// Implementations must be deterministic: equal inputs give equal classes.
pub trait Model: Send + Sync {
    /// Number of features the model consumes
    fn input_width(&self) -> usize;

    /// Feature names in input order, when the model publishes them
    fn feature_names(&self) -> Option<&[&'static str]> {
        None
    }

    fn predict(&self, features: &[f32]) -> Result<i64>;

    fn version(&self) -> &str;
}

/// Adapter from samples to classifications over an injected [`Model`]
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn Model>,
}

impl Classifier {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }

    /// Fail unless the model consumes exactly our feature layout
    pub fn check_layout(&self) -> Result<(), ClassifyError> {
        let width = self.model.input_width();
        if width != FEATURE_COUNT {
            return Err(ClassifyError::Unavailable(format!(
                "model expects {} features, sample provides {}",
                width, FEATURE_COUNT
            )));
        }

        if let Some(names) = self.model.feature_names() {
            if names != FEATURE_NAMES.as_slice() {
                return Err(ClassifyError::Unavailable(format!(
                    "model feature order {:?} does not match {:?}",
                    names, FEATURE_NAMES
                )));
            }
        }

        Ok(())
    }

    pub fn classify(&self, sample: &Sample) -> Result<Classification, ClassifyError> {
        self.check_layout()?;

        let features = FeatureVector::from_sample(sample);
        let class = self
            .model
            .predict(features.as_slice())
            .map_err(|e| ClassifyError::Unavailable(format!("{:#}", e)))?;

        recommendation_for(class)
    }
}
