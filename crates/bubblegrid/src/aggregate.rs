//! Field → file → batch aggregation hierarchy.
//!
//! [`FileAggregate`] owns every sample measured for one file and derives the
//! file-wide fallback threshold from them, once. [`BatchAggregate`] holds
//! batch-level counters only; no raw samples are retained across files, so
//! batch memory stays bounded regardless of batch size.

use std::collections::HashMap;

use crate::config::ThresholdConfig;
use crate::sample::BubbleSample;
use crate::threshold::{GlobalThreshold, ThresholdResult, ThresholdStrategy};
use crate::FileResult;

/// Per-file sample store and file-wide threshold derivation.
///
/// Created fresh for each file; never shared across worker tasks.
#[derive(Debug, Default)]
pub struct FileAggregate<'t> {
    field_samples: HashMap<String, Vec<BubbleSample<'t>>>,
    global: Option<ThresholdResult>,
}

impl<'t> FileAggregate<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one field's samples. Replaces any earlier record for the same
    /// label.
    pub fn record(&mut self, field_label: &str, samples: Vec<BubbleSample<'t>>) {
        self.field_samples.insert(field_label.to_string(), samples);
    }

    /// Samples recorded for a field, empty if the field was never recorded.
    pub fn samples_for(&self, field_label: &str) -> &[BubbleSample<'t>] {
        self.field_samples
            .get(field_label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Flat view of every mean intensity recorded for this file.
    pub fn all_mean_values(&self) -> Vec<f32> {
        self.field_samples
            .values()
            .flatten()
            .map(|s| s.mean_intensity)
            .collect()
    }

    /// Number of fields recorded so far.
    pub fn n_fields(&self) -> usize {
        self.field_samples.len()
    }

    /// Number of samples recorded so far, across all fields.
    pub fn n_samples(&self) -> usize {
        self.field_samples.values().map(Vec::len).sum()
    }

    /// File-wide fallback threshold, derived lazily and memoized.
    ///
    /// Call after all fields have been recorded: the value is computed from
    /// whatever samples are present at first call and never recomputed.
    pub fn global_threshold(&mut self, config: &ThresholdConfig) -> ThresholdResult {
        if let Some(t) = self.global {
            return t;
        }
        let values = self.all_mean_values();
        let t = GlobalThreshold.calculate(&values, config);
        tracing::debug!(
            value = t.value,
            max_jump = t.max_jump,
            confidence = t.confidence,
            n_samples = values.len(),
            "file fallback threshold"
        );
        self.global = Some(t);
        t
    }
}

/// Batch-wide counters, shared across workers behind a `Mutex`.
///
/// Reset at batch start by constructing a fresh instance.
#[derive(Debug, Default)]
pub struct BatchAggregate {
    files_processed: u64,
    files_failed: u64,
    files_multi_marked: u64,
    fields_interpreted: u64,
    fields_fallback: u64,
}

impl BatchAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one successful file result into the counters.
    pub fn record_success(&mut self, result: &FileResult) {
        self.files_processed += 1;
        if result.is_multi_marked {
            self.files_multi_marked += 1;
        }
        self.fields_interpreted += result.fields.len() as u64;
        self.fields_fallback += result
            .fields
            .iter()
            .filter(|f| f.threshold.fallback_used)
            .count() as u64;
    }

    /// Count one failed file. Failed files contribute nothing else.
    pub fn record_failure(&mut self) {
        self.files_failed += 1;
    }

    /// Read-only copy of the current counters.
    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            files_processed: self.files_processed,
            files_failed: self.files_failed,
            files_multi_marked: self.files_multi_marked,
            fields_interpreted: self.fields_interpreted,
            fields_fallback: self.fields_fallback,
        }
    }
}

/// Plain copy of batch counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchSnapshot {
    pub files_processed: u64,
    pub files_failed: u64,
    pub files_multi_marked: u64,
    pub fields_interpreted: u64,
    pub fields_fallback: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{BubbleDef, Region};

    fn bubble(value: &str) -> BubbleDef {
        BubbleDef {
            value: value.to_string(),
            region: Region::new(0, 0, 10, 10),
        }
    }

    #[test]
    fn global_threshold_is_memoized() {
        let a = bubble("A");
        let b = bubble("B");
        let mut agg = FileAggregate::new();
        agg.record(
            "q1",
            vec![BubbleSample::new(40.0, &a), BubbleSample::new(210.0, &b)],
        );

        let config = ThresholdConfig::default();
        let first = agg.global_threshold(&config);

        // Later records must not change the memoized value.
        agg.record(
            "q2",
            vec![BubbleSample::new(90.0, &a), BubbleSample::new(95.0, &b)],
        );
        let second = agg.global_threshold(&config);
        assert_eq!(first.value.to_bits(), second.value.to_bits());
        assert_eq!(first.method, second.method);
    }

    #[test]
    fn all_mean_values_flattens_fields() {
        let a = bubble("A");
        let mut agg = FileAggregate::new();
        agg.record("q1", vec![BubbleSample::new(40.0, &a)]);
        agg.record(
            "q2",
            vec![BubbleSample::new(200.0, &a), BubbleSample::new(210.0, &a)],
        );
        assert_eq!(agg.n_fields(), 2);
        assert_eq!(agg.n_samples(), 3);
        let mut values = agg.all_mean_values();
        values.sort_by(f32::total_cmp);
        assert_eq!(values, vec![40.0, 200.0, 210.0]);
    }

    #[test]
    fn samples_for_unknown_field_is_empty() {
        let agg = FileAggregate::new();
        assert!(agg.samples_for("missing").is_empty());
    }

    #[test]
    fn batch_counters_accumulate() {
        let mut batch = BatchAggregate::new();
        batch.record_failure();
        let snap = batch.snapshot();
        assert_eq!(snap.files_failed, 1);
        assert_eq!(snap.files_processed, 0);
    }
}
