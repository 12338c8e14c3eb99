//! Per-file pipeline: detection, aggregation, interpretation.
//!
//! [`FileProcessor`] measures every bubble of every template field through a
//! [`RegionSampler`], derives the file-wide fallback threshold once, then
//! interprets each field against it and assembles the output record.

use std::collections::BTreeMap;
use std::path::Path;

use image::GrayImage;

use crate::aggregate::FileAggregate;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::interpret::interpret_field;
use crate::sample::BubbleSample;
use crate::template::{Region, SheetTemplate};
use crate::{FileResult, QualitySummary};

/// External measurement capability: loads a sheet image and measures mean
/// region intensities on it. Implementations must be shareable across
/// worker threads.
pub trait RegionSampler: Sync {
    /// Loaded image representation.
    type Image: Send;

    /// Load the sheet at `path`.
    fn load(&self, path: &Path) -> Result<Self::Image, EngineError>;

    /// Mean intensity of `region`, 0 (black) – 255 (white).
    fn mean_intensity(&self, image: &Self::Image, region: &Region) -> f32;
}

/// Built-in sampler reading grayscale images from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraySampler;

impl RegionSampler for GraySampler {
    type Image = GrayImage;

    fn load(&self, path: &Path) -> Result<GrayImage, EngineError> {
        let img = image::open(path).map_err(|source| EngineError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(img.to_luma8())
    }

    fn mean_intensity(&self, image: &GrayImage, region: &Region) -> f32 {
        mean_region_intensity(image, region)
    }
}

/// Mean pixel intensity over `region`, clipped to image bounds.
///
/// A region lying fully outside the image reads as blank paper (scale
/// maximum) rather than as a mark.
pub fn mean_region_intensity(img: &GrayImage, region: &Region) -> f32 {
    let (w, h) = img.dimensions();
    let x1 = region.x.min(w);
    let y1 = region.y.min(h);
    let x2 = region.x.saturating_add(region.w).min(w);
    let y2 = region.y.saturating_add(region.h).min(h);
    if x2 <= x1 || y2 <= y1 {
        return 255.0;
    }
    let mut sum = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            sum += img.get_pixel(x, y)[0] as u64;
        }
    }
    let count = (x2 - x1) as u64 * (y2 - y1) as u64;
    sum as f32 / count as f32
}

/// Runs detection + interpretation for single files.
///
/// Holds no per-file state; every `process` call allocates its own
/// [`FileAggregate`], so one processor can serve concurrent callers.
pub struct FileProcessor<'e, S: RegionSampler> {
    config: &'e EngineConfig,
    sampler: &'e S,
}

impl<'e, S: RegionSampler> FileProcessor<'e, S> {
    pub fn new(config: &'e EngineConfig, sampler: &'e S) -> Self {
        Self { config, sampler }
    }

    /// Process one sheet. `input_index` is the file's position in the
    /// original batch enumeration and tags the result for downstream
    /// ordering.
    ///
    /// An unreadable image fails the whole file; a field with zero bubble
    /// regions degenerates to a blank, poor-quality interpretation instead.
    pub fn process(
        &self,
        path: &Path,
        input_index: usize,
        template: &SheetTemplate,
    ) -> Result<FileResult, EngineError> {
        let image = self.sampler.load(path)?;

        let mut aggregate = FileAggregate::new();
        for field in &template.fields {
            let samples: Vec<BubbleSample<'_>> = field
                .bubbles
                .iter()
                .map(|b| BubbleSample::new(self.sampler.mean_intensity(&image, &b.region), b))
                .collect();
            if samples.is_empty() {
                tracing::warn!(
                    file = %path.display(),
                    field = %field.label,
                    "field has no bubble regions, treating as blank"
                );
            }
            aggregate.record(&field.label, samples);
        }

        let global = aggregate.global_threshold(&self.config.threshold);

        let mut fields = Vec::with_capacity(template.fields.len());
        let mut response = BTreeMap::new();
        for field in &template.fields {
            let interp = interpret_field(
                field,
                aggregate.samples_for(&field.label),
                global.value,
                &self.config.threshold,
            );
            response.insert(
                field.label.clone(),
                interp.response_string(field.bubbles.len(), template.empty_value_for(field)),
            );
            fields.push(interp);
        }

        let quality = QualitySummary::from_fields(&fields);
        let is_multi_marked = fields.iter().any(|f| f.is_multi_marked);
        tracing::debug!(
            file = %path.display(),
            input_index,
            fields = fields.len(),
            is_multi_marked,
            "file processed"
        );

        Ok(FileResult {
            input_index,
            file_path: path.to_path_buf(),
            response,
            is_multi_marked,
            quality,
            fields,
        })
    }
}
