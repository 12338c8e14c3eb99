//! bubblegrid — pure-Rust detection & interpretation engine for scanned
//! OMR answer sheets.
//!
//! Converts per-bubble pixel measurements into structured per-question
//! answers. The pipeline stages are:
//!
//! 1. **Detect** – measure the mean intensity of every bubble region on a
//!    sheet through the [`RegionSampler`] seam.
//! 2. **Aggregate** – collect samples into a per-file [`FileAggregate`] and
//!    derive the file-wide fallback threshold from the largest intensity gap.
//! 3. **Interpret** – split each field's intensities into marked/unmarked via
//!    adaptive local thresholding with file-wide fallback, grading scan
//!    quality from intensity spread.
//! 4. **Schedule** – run the per-file pipeline across a batch on a bounded
//!    worker pool, emitting results strictly in original input order.
//!
//! # Public API
//! - [`BatchScheduler`] and [`SheetTemplate`] as primary entry points
//! - [`FileProcessor`] for single-sheet processing
//! - [`EngineConfig`] / [`ThresholdConfig`] for tuning
//! - [`RegionSampler`] / [`OutputSink`] traits at the engine boundary

mod aggregate;
mod batch;
mod config;
mod error;
mod interpret;
mod process;
mod sample;
mod template;
#[cfg(test)]
mod test_utils;
mod threshold;

pub use aggregate::{BatchAggregate, BatchSnapshot, FileAggregate};
pub use batch::{BatchScheduler, MemorySink, OutputSink};
pub use config::{EngineConfig, ThresholdConfig, RECOMMENDED_MAX_WORKERS};
pub use error::EngineError;
pub use interpret::{interpret_field, FieldInterpretation, ScanQuality};
pub use process::{mean_region_intensity, FileProcessor, GraySampler, RegionSampler};
pub use sample::BubbleSample;
pub use template::{BubbleDef, FieldDef, Region, SheetTemplate};
pub use threshold::{
    AdaptiveThreshold, GlobalThreshold, LocalThreshold, ThresholdMethod, ThresholdResult,
    ThresholdStrategy,
};

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-file counts of fields at each quality grade.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct QualitySummary {
    pub excellent: usize,
    pub good: usize,
    pub acceptable: usize,
    pub poor: usize,
    /// Mean threshold confidence across the file's fields.
    pub mean_confidence: f32,
}

impl QualitySummary {
    pub fn from_fields(fields: &[FieldInterpretation]) -> Self {
        let mut summary = Self::default();
        for field in fields {
            match field.quality {
                ScanQuality::Excellent => summary.excellent += 1,
                ScanQuality::Good => summary.good += 1,
                ScanQuality::Acceptable => summary.acceptable += 1,
                ScanQuality::Poor => summary.poor += 1,
            }
        }
        if !fields.is_empty() {
            summary.mean_confidence = fields
                .iter()
                .map(|f| f.threshold.confidence)
                .sum::<f32>()
                / fields.len() as f32;
        }
        summary
    }
}

/// Full interpretation result for a single sheet.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileResult {
    /// Position of the file in the original batch enumeration; the sole
    /// ordering key for emitted output.
    pub input_index: usize,
    pub file_path: PathBuf,
    /// Field label → answer string.
    pub response: BTreeMap<String, String>,
    /// At least one field registered more than one mark.
    pub is_multi_marked: bool,
    pub quality: QualitySummary,
    /// Per-field interpretation detail, in template field order.
    pub fields: Vec<FieldInterpretation>,
}

/// One batch slot: a processed file or its reported failure.
///
/// Failed files keep their `input_index` so positional output downstream
/// stays aligned with the input enumeration.
#[derive(Debug)]
pub struct FileSlot {
    pub input_index: usize,
    pub path: PathBuf,
    pub outcome: Result<FileResult, EngineError>,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BatchSummary {
    /// Number of files submitted, including failed ones.
    pub total_files: usize,
    pub counters: BatchSnapshot,
}
