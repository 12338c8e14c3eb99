//! Field interpretation: intensity samples → marked answers + quality metrics.

use crate::config::ThresholdConfig;
use crate::sample::{mean_values, population_std, BubbleSample};
use crate::template::FieldDef;
use crate::threshold::{LocalThreshold, ThresholdResult, ThresholdStrategy};

/// Quality grade of one field's scan, derived from intensity spread.
///
/// Higher spread means cleaner bimodal separation between marked and
/// unmarked bubbles, and therefore higher trust in the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanQuality {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl ScanQuality {
    /// Grade from the population std-deviation of bubble intensities.
    pub fn from_std_deviation(std: f32) -> Self {
        if std > 50.0 {
            Self::Excellent
        } else if std > 30.0 {
            Self::Good
        } else if std > 15.0 {
            Self::Acceptable
        } else {
            Self::Poor
        }
    }
}

/// Final interpretation of one field on one sheet. Immutable once created.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FieldInterpretation {
    pub field_label: String,
    /// Values of marked bubbles, in the field's position order.
    pub marked_values: Vec<String>,
    /// More than one bubble registered as marked. A flag, not an error.
    pub is_multi_marked: bool,
    /// Threshold the marked/unmarked split was made against.
    pub threshold: ThresholdResult,
    /// Population std-deviation of the field's intensities.
    pub std_deviation: f32,
    pub quality: ScanQuality,
}

impl FieldInterpretation {
    /// Response string for this field: concatenated marked values, or the
    /// empty value when nothing is marked. A field where *every* bubble
    /// reads as marked is treated as blank too — an all-dark field is a scan
    /// artifact, not an answer.
    pub fn response_string(&self, n_bubbles: usize, empty_value: &str) -> String {
        if self.marked_values.is_empty()
            || (n_bubbles > 0 && self.marked_values.len() == n_bubbles)
        {
            return empty_value.to_string();
        }
        self.marked_values.concat()
    }
}

/// Interpret one field's samples against a local threshold with file-wide
/// fallback.
///
/// A sample is marked iff its mean intensity is strictly below the threshold
/// value. Zero marks is a valid blank answer. The result depends only on the
/// inputs; rerunning on identical samples yields identical output.
pub fn interpret_field(
    field: &FieldDef,
    samples: &[BubbleSample<'_>],
    global_fallback: f32,
    config: &ThresholdConfig,
) -> FieldInterpretation {
    let values = mean_values(samples);
    let std_deviation = population_std(&values);

    let strategy = LocalThreshold { global_fallback };
    let threshold = strategy.calculate(&values, config);

    let marked_values: Vec<String> = samples
        .iter()
        .filter(|s| s.mean_intensity < threshold.value)
        .map(|s| s.bubble.value.clone())
        .collect();

    let is_multi_marked = marked_values.len() > 1;
    if is_multi_marked {
        tracing::warn!(
            field = %field.label,
            marked = marked_values.len(),
            threshold = threshold.value,
            "multiple bubbles marked"
        );
    }

    FieldInterpretation {
        field_label: field.label.clone(),
        marked_values,
        is_multi_marked,
        threshold,
        std_deviation,
        quality: ScanQuality::from_std_deviation(std_deviation),
    }
}
