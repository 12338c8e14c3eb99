//! Threshold calculation strategies for bubble field interpretation.
//!
//! Marked bubbles cluster at low intensity and unmarked bubbles at high
//! intensity, so the largest gap in the sorted intensities is the most likely
//! separator between the two clusters. [`GlobalThreshold`] applies that scan
//! to every sample in a file; [`LocalThreshold`] applies it to a single
//! field's samples and falls back to the file-wide value whenever the field's
//! own evidence is too weak to trust.

use crate::config::ThresholdConfig;
use crate::sample::population_std;

/// Maximum grayscale intensity. A local threshold that degenerates to this
/// value found no usable gap and always falls back.
const INTENSITY_MAX: f32 = 255.0;

/// How a threshold value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Largest-gap scan over all samples in the file.
    Global,
    /// Largest-gap scan over one field's samples.
    Local,
    /// Field evidence was too weak; the file-wide fallback value was used.
    LocalFallbackToGlobal,
}

/// Result of one threshold derivation. Produced fresh per field per file.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ThresholdResult {
    /// Cut value: a sample strictly below this is marked.
    pub value: f32,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Largest windowed gap seen in the sorted samples.
    pub max_jump: f32,
    /// Derivation method.
    pub method: ThresholdMethod,
    /// True when the derivation fell back to a default or file-wide value.
    pub fallback_used: bool,
}

/// Strategy seam for threshold derivation.
///
/// Further variants can be added without touching field interpretation;
/// [`AdaptiveThreshold`] shows a confidence-weighted combination.
pub trait ThresholdStrategy {
    fn calculate(&self, values: &[f32], config: &ThresholdConfig) -> ThresholdResult;
}

/// Largest windowed gap in ascending `sorted`, with the split placed at the
/// gap midpoint. The window half-width (`looseness`) skips single-sample
/// edge noise; it is clamped so the scan always fits.
///
/// Requires `sorted.len() >= 2`. The returned split always lies within
/// `[sorted.first(), sorted.last()]`.
fn largest_gap_split(sorted: &[f32], looseness: usize) -> (f32, f32) {
    let n = sorted.len();
    debug_assert!(n >= 2);
    if n == 2 {
        let jump = sorted[1] - sorted[0];
        return (sorted[0] + jump / 2.0, jump);
    }
    let ls = looseness.max(1).min((n - 1) / 2);
    let mut max_jump = 0.0f32;
    let mut value = sorted[0] + (sorted[n - 1] - sorted[0]) / 2.0;
    for i in ls..(n - ls) {
        let jump = sorted[i + ls] - sorted[i - ls];
        if jump > max_jump {
            max_jump = jump;
            value = sorted[i - ls] + jump / 2.0;
        }
    }
    (value, max_jump)
}

fn sorted_ascending(values: &[f32]) -> Vec<f32> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    sorted
}

/// File-wide largest-gap threshold.
///
/// Derived once per file over every bubble sample; fields with weak local
/// evidence fall back to this value.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalThreshold;

impl ThresholdStrategy for GlobalThreshold {
    fn calculate(&self, values: &[f32], config: &ThresholdConfig) -> ThresholdResult {
        if values.len() < 2 {
            return ThresholdResult {
                value: config.default_threshold,
                confidence: 0.0,
                max_jump: 0.0,
                method: ThresholdMethod::Global,
                fallback_used: true,
            };
        }
        let sorted = sorted_ascending(values);
        let (value, max_jump) = largest_gap_split(&sorted, config.looseness);
        ThresholdResult {
            value,
            confidence: (max_jump / (3.0 * config.min_jump)).min(1.0),
            max_jump,
            method: ThresholdMethod::Global,
            fallback_used: max_jump < config.min_jump,
        }
    }
}

/// Per-field threshold with file-wide fallback.
#[derive(Debug, Clone, Copy)]
pub struct LocalThreshold {
    /// File-wide value used when local evidence is weak.
    pub global_fallback: f32,
}

impl LocalThreshold {
    fn fallback(&self, confidence: f32, max_jump: f32) -> ThresholdResult {
        ThresholdResult {
            value: self.global_fallback,
            confidence,
            max_jump,
            method: ThresholdMethod::LocalFallbackToGlobal,
            fallback_used: true,
        }
    }
}

impl ThresholdStrategy for LocalThreshold {
    fn calculate(&self, values: &[f32], config: &ThresholdConfig) -> ThresholdResult {
        // Degenerate field: nothing to split.
        if values.len() < 2 {
            return self.fallback(0.0, 0.0);
        }

        let sorted = sorted_ascending(values);

        // Two bubbles: a genuine mark against a blank produces a large,
        // unambiguous gap. A small gap means neither is confidently marked.
        if sorted.len() == 2 {
            let gap = sorted[1] - sorted[0];
            if gap < config.min_gap_two_bubbles {
                return self.fallback(0.3, gap);
            }
            return ThresholdResult {
                value: (sorted[0] + sorted[1]) / 2.0,
                confidence: 0.7,
                max_jump: gap,
                method: ThresholdMethod::Local,
                fallback_used: false,
            };
        }

        // Three or more: windowed largest-gap scan. The split starts at the
        // scale maximum and only moves once a gap beats `min_jump`; a split
        // still at the maximum therefore means no meaningful gap exists and
        // must never be used as a threshold.
        let n = sorted.len();
        let ls = config.looseness.max(1).min((n - 1) / 2);
        let mut max_jump = config.min_jump;
        let mut value = INTENSITY_MAX;
        for i in ls..(n - ls) {
            let jump = sorted[i + ls] - sorted[i - ls];
            if jump > max_jump {
                max_jump = jump;
                value = sorted[i - ls] + jump / 2.0;
            }
        }

        let confident_jump = config.min_jump + config.min_jump_surplus;
        let no_outliers = population_std(values) < config.outlier_deviation_threshold;
        if max_jump < confident_jump && (no_outliers || value >= INTENSITY_MAX) {
            tracing::debug!(
                max_jump,
                confident_jump,
                fallback = self.global_fallback,
                "local gap not confident, using file fallback"
            );
            return self.fallback(0.4, max_jump);
        }
        if max_jump < confident_jump {
            tracing::warn!(
                max_jump,
                confident_jump,
                value,
                "keeping low-confidence local threshold"
            );
        }
        ThresholdResult {
            value,
            confidence: (max_jump / (2.0 * confident_jump)).min(1.0),
            max_jump,
            method: ThresholdMethod::Local,
            fallback_used: false,
        }
    }
}

/// Confidence-weighted combination of other strategies.
///
/// Each inner strategy contributes its value weighted by `confidence *
/// weight`; zero total confidence degenerates to the configured default.
pub struct AdaptiveThreshold {
    strategies: Vec<Box<dyn ThresholdStrategy + Send + Sync>>,
    weights: Vec<f32>,
}

impl AdaptiveThreshold {
    pub fn new(
        strategies: Vec<Box<dyn ThresholdStrategy + Send + Sync>>,
        weights: Vec<f32>,
    ) -> Result<Self, crate::error::EngineError> {
        if strategies.is_empty() || strategies.len() != weights.len() {
            return Err(crate::error::EngineError::InvalidConfig(
                "adaptive threshold needs one weight per strategy".to_string(),
            ));
        }
        Ok(Self {
            strategies,
            weights,
        })
    }

    /// Default combination: file-global plus per-field strategies, biased
    /// toward the local view.
    pub fn with_global_fallback(global_fallback: f32) -> Self {
        Self {
            strategies: vec![
                Box::new(GlobalThreshold),
                Box::new(LocalThreshold { global_fallback }),
            ],
            weights: vec![0.4, 0.6],
        }
    }
}

impl ThresholdStrategy for AdaptiveThreshold {
    fn calculate(&self, values: &[f32], config: &ThresholdConfig) -> ThresholdResult {
        let results: Vec<ThresholdResult> = self
            .strategies
            .iter()
            .map(|s| s.calculate(values, config))
            .collect();

        let total: f32 = results
            .iter()
            .zip(&self.weights)
            .map(|(r, w)| r.confidence * w)
            .sum();

        let Some((first, rest)) = results.split_first() else {
            // Constructor guarantees at least one strategy.
            return ThresholdResult {
                value: config.default_threshold,
                confidence: 0.0,
                max_jump: 0.0,
                method: ThresholdMethod::Global,
                fallback_used: true,
            };
        };

        if total <= 0.0 {
            return ThresholdResult {
                value: config.default_threshold,
                confidence: 0.0,
                max_jump: 0.0,
                method: ThresholdMethod::Global,
                fallback_used: true,
            };
        }

        let value = results
            .iter()
            .zip(&self.weights)
            .map(|(r, w)| r.value * r.confidence * w)
            .sum::<f32>()
            / total;

        let mut best = *first;
        for r in rest {
            if r.confidence > best.confidence {
                best = *r;
            }
        }

        ThresholdResult {
            value,
            confidence: best.confidence,
            max_jump: results.iter().map(|r| r.max_jump).fold(0.0, f32::max),
            method: best.method,
            fallback_used: results.iter().any(|r| r.fallback_used),
        }
    }
}
