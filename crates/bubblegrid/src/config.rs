//! Engine configuration.
//!
//! All tunables carry numeric defaults calibrated for 0–255 grayscale scans.

/// Recommended upper bound for the worker pool size.
pub const RECOMMENDED_MAX_WORKERS: usize = 16;

/// Tunables for threshold derivation.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Minimum intensity separation between the marked and unmarked clusters
    /// for a gap to be considered meaningful.
    pub min_jump: f32,
    /// Minimum gap required to trust a local split when a field has exactly
    /// two bubbles.
    pub min_gap_two_bubbles: f32,
    /// Extra jump beyond `min_jump` required before a local threshold is
    /// considered confident.
    pub min_jump_surplus: f32,
    /// A field whose intensity std-deviation is below this value counts as
    /// outlier-free when deciding whether to fall back to the file threshold.
    pub outlier_deviation_threshold: f32,
    /// Mid-scale cut used when no data-driven threshold can be derived.
    pub default_threshold: f32,
    /// Lookahead window (in sorted positions) for the largest-gap scan.
    /// Widening it makes the scan ignore single-sample edge noise.
    pub looseness: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_jump: 25.0,
            min_gap_two_bubbles: 30.0,
            min_jump_surplus: 10.0,
            outlier_deviation_threshold: 5.0,
            default_threshold: 127.5,
            looseness: 1,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Threshold derivation tunables.
    pub threshold: ThresholdConfig,
    /// Worker pool size for batch processing. `1` forces strict sequential
    /// execution with immediate in-order emission.
    pub worker_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            worker_count: 4,
        }
    }
}
