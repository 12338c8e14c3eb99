//! Bubble intensity samples and the small statistics used on them.

use crate::template::BubbleDef;

/// One bubble region's measured mean intensity.
///
/// Carries a back-reference to its bubble definition so interpretation can
/// recover the answer label and position without re-indexing the template.
/// Immutable once created.
#[derive(Debug, Clone, Copy)]
pub struct BubbleSample<'t> {
    /// Mean pixel intensity over the bubble region, 0 (black) – 255 (white).
    pub mean_intensity: f32,
    /// Bubble definition this sample was measured from.
    pub bubble: &'t BubbleDef,
}

impl<'t> BubbleSample<'t> {
    pub fn new(mean_intensity: f32, bubble: &'t BubbleDef) -> Self {
        Self {
            mean_intensity,
            bubble,
        }
    }
}

/// Extract the raw mean values from a sample slice.
pub(crate) fn mean_values(samples: &[BubbleSample<'_>]) -> Vec<f32> {
    samples.iter().map(|s| s.mean_intensity).collect()
}

/// Population standard deviation. Zero for empty input.
pub(crate) fn population_std(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_std_matches_hand_computation() {
        // mean 100, deviations ±50 -> std 50
        let std = population_std(&[50.0, 150.0]);
        assert!((std - 50.0).abs() < 1e-4, "expected 50, got {std}");
    }

    #[test]
    fn population_std_empty_is_zero() {
        assert_eq!(population_std(&[]), 0.0);
    }
}
