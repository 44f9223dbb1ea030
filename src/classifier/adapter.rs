//! Maps a continuous regressor output onto a class index and confidence

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Scorer;
use crate::error::{PipelineError, PipelineResult};
use crate::features::FeatureVector;

/// Outcome of scoring one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Index into the label table, always `< num_classes`
    pub class_index: usize,
    /// In `(0, 1]`, equal to 1 only when the raw value is 0
    pub confidence: f64,
    /// The regressor output before rounding
    pub raw_value: f64,
}

/// `1 - |v| / (1 + |v|)`, written as `1 / (1 + |v|)` so large magnitudes
/// stay strictly positive.
pub fn confidence(raw_value: f64) -> f64 {
    1.0 / (1.0 + raw_value.abs())
}

/// Derive class index and confidence from a raw regressor value.
///
/// The class index is `round(v)` clamped into `[0, num_classes - 1]`.
/// Non-finite values are rejected rather than clamped.
pub fn derive(raw_value: f64, num_classes: usize) -> PipelineResult<ClassificationResult> {
    if num_classes == 0 {
        return Err(PipelineError::Classifier(
            "label table is empty".to_string(),
        ));
    }
    if !raw_value.is_finite() {
        return Err(PipelineError::Classifier(format!(
            "scorer returned non-finite value {}",
            raw_value
        )));
    }

    let max_index = (num_classes - 1) as f64;
    let class_index = raw_value.round().clamp(0.0, max_index) as usize;

    Ok(ClassificationResult {
        class_index,
        confidence: confidence(raw_value),
        raw_value,
    })
}

/// Score `features` and derive the classification.
///
/// The width check happens before the scorer is invoked, so a mismatched
/// vector never reaches the backend.
pub fn classify(
    features: &FeatureVector,
    scorer: &dyn Scorer,
    num_classes: usize,
) -> PipelineResult<ClassificationResult> {
    let expected = scorer.input_width();
    if features.len() != expected {
        return Err(PipelineError::FeatureShape {
            expected,
            actual: features.len(),
        });
    }

    let raw_value = scorer
        .score(features.as_slice())
        .map_err(|e| PipelineError::Classifier(e.to_string()))?;
    let result = derive(raw_value, num_classes)?;

    debug!(
        "Scored {} features: raw={:.4}, class={}, confidence={:.4}",
        features.len(),
        raw_value,
        result.class_index,
        result.confidence
    );

    Ok(result)
}
