//! Human-facing classification report

use serde::{Deserialize, Serialize};

use crate::classifier::ClassificationResult;
use crate::error::{PipelineError, PipelineResult};

/// Label and confidence for one classified recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub label: String,
    pub class_index: usize,
    /// `confidence * 100`, in `(0, 100]`
    pub confidence_percent: f64,
}

/// Look up the label for `result` and scale its confidence to a percentage
pub fn report<S: AsRef<str>>(
    result: &ClassificationResult,
    labels: &[S],
) -> PipelineResult<Report> {
    let label = labels.get(result.class_index).ok_or_else(|| {
        PipelineError::Classifier(format!(
            "class index {} outside label table of {}",
            result.class_index,
            labels.len()
        ))
    })?;

    Ok(Report {
        label: label.as_ref().to_string(),
        class_index: result.class_index,
        confidence_percent: result.confidence * 100.0,
    })
}
