//! Batch scheduling: a bounded worker pool with order-preserving emission.
//!
//! Files are independent units of work; workers share nothing per-file.
//! Results are collected in completion order, reordered by `input_index`,
//! and only then emitted — output order correctness takes priority over
//! streaming latency. With a single worker the pipeline degenerates to
//! strict sequential execution and emission happens immediately, with no
//! reordering work.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;

use crate::aggregate::BatchAggregate;
use crate::config::{EngineConfig, RECOMMENDED_MAX_WORKERS};
use crate::error::EngineError;
use crate::process::{FileProcessor, RegionSampler};
use crate::template::SheetTemplate;
use crate::{BatchSummary, FileSlot};

/// Where ordered results are delivered.
///
/// The scheduler guarantees `accept` is called in ascending `input_index`
/// order, exactly once per submitted file.
pub trait OutputSink {
    fn accept(&mut self, slot: FileSlot);
}

/// Sink that buffers slots in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub slots: Vec<FileSlot>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemorySink {
    fn accept(&mut self, slot: FileSlot) {
        self.slots.push(slot);
    }
}

/// Runs the per-file pipeline across a batch of sheets.
pub struct BatchScheduler<'e, S: RegionSampler> {
    config: &'e EngineConfig,
    sampler: &'e S,
}

impl<'e, S: RegionSampler> BatchScheduler<'e, S> {
    pub fn new(config: &'e EngineConfig, sampler: &'e S) -> Self {
        Self { config, sampler }
    }

    /// Process `files` and emit one slot per file to `sink`, in input order.
    ///
    /// Contract violations (zero workers, malformed template) abort before
    /// any file is dispatched. Per-file failures never abort the batch; the
    /// failed slot is emitted in place and counted in the summary.
    pub fn run(
        &self,
        files: &[PathBuf],
        template: &SheetTemplate,
        sink: &mut dyn OutputSink,
    ) -> Result<BatchSummary, EngineError> {
        let workers = self.config.worker_count;
        if workers == 0 {
            return Err(EngineError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if workers > RECOMMENDED_MAX_WORKERS {
            tracing::warn!(
                workers,
                max = RECOMMENDED_MAX_WORKERS,
                "worker count above recommended maximum"
            );
        }
        template.validate()?;

        tracing::info!(files = files.len(), workers, "batch start");
        let batch = Mutex::new(BatchAggregate::new());
        let processor = FileProcessor::new(self.config, self.sampler);

        if workers == 1 {
            // In-order execution: results are already ordered, emit as we go.
            for (input_index, path) in files.iter().enumerate() {
                let slot = process_one(&processor, input_index, path, template, &batch);
                sink.accept(slot);
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| {
                    EngineError::InvalidConfig(format!("failed to build worker pool: {e}"))
                })?;

            let (tx, rx) = mpsc::channel();
            {
                let processor = &processor;
                let batch = &batch;
                // The sender moves into the scope and is gone once every
                // task has completed, which terminates the receiver below.
                pool.scope(move |scope| {
                    for (input_index, path) in files.iter().enumerate() {
                        let tx = tx.clone();
                        scope.spawn(move |_| {
                            let slot = process_one(processor, input_index, path, template, batch);
                            // The receiver outlives the scope.
                            let _ = tx.send(slot);
                        });
                    }
                });
            }

            // Completion order is arbitrary; restore the input enumeration
            // order before anything reaches the sink.
            let mut slots: Vec<FileSlot> = rx.iter().collect();
            slots.sort_by_key(|slot| slot.input_index);
            for slot in slots {
                sink.accept(slot);
            }
        }

        let counters = match batch.lock() {
            Ok(agg) => agg.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        };
        let summary = BatchSummary {
            total_files: files.len(),
            counters,
        };
        tracing::info!(
            total = summary.total_files,
            succeeded = counters.files_processed,
            failed = counters.files_failed,
            multi_marked = counters.files_multi_marked,
            "batch done"
        );
        Ok(summary)
    }
}

/// Process one file and fold its outcome into the batch counters.
///
/// Counter updates happen under the lock after processing completes; the
/// lock is never held across image I/O.
fn process_one<S: RegionSampler>(
    processor: &FileProcessor<'_, S>,
    input_index: usize,
    path: &Path,
    template: &SheetTemplate,
    batch: &Mutex<BatchAggregate>,
) -> FileSlot {
    let outcome = processor.process(path, input_index, template);
    if let Err(err) = &outcome {
        tracing::warn!(file = %path.display(), input_index, error = %err, "file failed");
    }
    if let Ok(mut agg) = batch.lock() {
        match &outcome {
            Ok(result) => agg.record_success(result),
            Err(_) => agg.record_failure(),
        }
    }
    FileSlot {
        input_index,
        path: path.to_path_buf(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Region;
    use crate::test_utils::four_option_field;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sampler that returns fixed per-sheet intensities and can delay
    /// individual files to force out-of-order completion. Records the order
    /// in which loads *finish*.
    struct StagedSampler {
        /// Per-file intensities for the four q1 bubbles; a missing entry
        /// simulates an unreadable image.
        sheets: HashMap<PathBuf, [f32; 4]>,
        delays: HashMap<PathBuf, Duration>,
        completion_log: Mutex<Vec<PathBuf>>,
    }

    impl StagedSampler {
        fn new(sheets: Vec<(PathBuf, [f32; 4])>) -> Self {
            Self {
                sheets: sheets.into_iter().collect(),
                delays: HashMap::new(),
                completion_log: Mutex::new(Vec::new()),
            }
        }

        fn delay(mut self, path: &str, ms: u64) -> Self {
            self.delays
                .insert(PathBuf::from(path), Duration::from_millis(ms));
            self
        }

        fn completion_order(&self) -> Vec<PathBuf> {
            self.completion_log
                .lock()
                .expect("completion log lock")
                .clone()
        }
    }

    impl RegionSampler for StagedSampler {
        type Image = [f32; 4];

        fn load(&self, path: &Path) -> Result<[f32; 4], EngineError> {
            if let Some(delay) = self.delays.get(path) {
                std::thread::sleep(*delay);
            }
            let sheet = self.sheets.get(path).copied().ok_or_else(|| {
                EngineError::ImageRead {
                    path: path.to_path_buf(),
                    source: image::ImageError::IoError(std::io::Error::from(
                        std::io::ErrorKind::NotFound,
                    )),
                }
            })?;
            self.completion_log
                .lock()
                .expect("completion log lock")
                .push(path.to_path_buf());
            Ok(sheet)
        }

        fn mean_intensity(&self, image: &[f32; 4], region: &Region) -> f32 {
            // Bubble regions are laid out 30px apart; recover the option index.
            let idx = ((region.x.saturating_sub(10)) / 30) as usize;
            image[idx.min(3)]
        }
    }

    fn test_template() -> SheetTemplate {
        let (field, _) = four_option_field("q1", 10, 10);
        SheetTemplate::new("quiz", vec![field])
    }

    fn marked_a() -> [f32; 4] {
        [40.0, 210.0, 215.0, 220.0]
    }

    #[test]
    fn parallel_batch_emits_in_input_order() {
        let files: Vec<PathBuf> = (0..3).map(|i| PathBuf::from(format!("s{i}.png"))).collect();
        // File 0 completes last, file 2 first.
        let sampler = StagedSampler::new(
            files.iter().map(|f| (f.clone(), marked_a())).collect(),
        )
        .delay("s0.png", 80)
        .delay("s1.png", 40);

        let config = EngineConfig {
            worker_count: 3,
            ..EngineConfig::default()
        };
        let scheduler = BatchScheduler::new(&config, &sampler);
        let mut sink = MemorySink::new();
        let summary = scheduler
            .run(&files, &test_template(), &mut sink)
            .expect("batch runs");

        let completion = sampler.completion_order();
        assert_eq!(
            completion,
            vec![
                PathBuf::from("s2.png"),
                PathBuf::from("s1.png"),
                PathBuf::from("s0.png")
            ],
            "delays should force reversed completion"
        );

        let emitted: Vec<usize> = sink.slots.iter().map(|s| s.input_index).collect();
        assert_eq!(emitted, vec![0, 1, 2]);
        assert_eq!(summary.counters.files_processed, 3);
        assert_eq!(summary.counters.files_failed, 0);
    }

    #[test]
    fn sequential_mode_preserves_submission_order() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("s{i}.png"))).collect();
        let sampler =
            StagedSampler::new(files.iter().map(|f| (f.clone(), marked_a())).collect());

        let config = EngineConfig {
            worker_count: 1,
            ..EngineConfig::default()
        };
        let scheduler = BatchScheduler::new(&config, &sampler);
        let mut sink = MemorySink::new();
        scheduler
            .run(&files, &test_template(), &mut sink)
            .expect("batch runs");

        let emitted: Vec<usize> = sink.slots.iter().map(|s| s.input_index).collect();
        assert_eq!(emitted, vec![0, 1, 2, 3, 4]);
        // In-order execution: completion order equals submission order.
        assert_eq!(sampler.completion_order(), files);
    }

    #[test]
    fn failed_file_keeps_its_slot_and_batch_continues() {
        let files = vec![
            PathBuf::from("s0.png"),
            PathBuf::from("s1.png"),
            PathBuf::from("s2.png"),
        ];
        // s1 has no sheet data: unreadable.
        let sampler = StagedSampler::new(vec![
            (files[0].clone(), marked_a()),
            (files[2].clone(), marked_a()),
        ]);

        let config = EngineConfig {
            worker_count: 2,
            ..EngineConfig::default()
        };
        let scheduler = BatchScheduler::new(&config, &sampler);
        let mut sink = MemorySink::new();
        let summary = scheduler
            .run(&files, &test_template(), &mut sink)
            .expect("batch runs");

        assert_eq!(sink.slots.len(), 3);
        assert_eq!(sink.slots[1].input_index, 1);
        assert!(sink.slots[1].outcome.is_err());
        assert!(sink.slots[0].outcome.is_ok());
        assert!(sink.slots[2].outcome.is_ok());
        assert_eq!(summary.counters.files_processed, 2);
        assert_eq!(summary.counters.files_failed, 1);
    }

    #[test]
    fn zero_workers_fails_before_dispatch() {
        let sampler = StagedSampler::new(Vec::new());
        let config = EngineConfig {
            worker_count: 0,
            ..EngineConfig::default()
        };
        let scheduler = BatchScheduler::new(&config, &sampler);
        let mut sink = MemorySink::new();
        let err = scheduler
            .run(&[PathBuf::from("s0.png")], &test_template(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
        assert!(sink.slots.is_empty(), "nothing may be dispatched");
    }

    #[test]
    fn invalid_template_fails_before_dispatch() {
        let sampler = StagedSampler::new(Vec::new());
        let config = EngineConfig::default();
        let scheduler = BatchScheduler::new(&config, &sampler);
        let mut sink = MemorySink::new();
        let template = SheetTemplate::new("empty", Vec::new());
        let err = scheduler
            .run(&[PathBuf::from("s0.png")], &template, &mut sink)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTemplate(_)));
        assert!(sink.slots.is_empty());
    }

    #[test]
    fn counter_updates_are_seen_once_per_file() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        struct CountingSink;
        impl OutputSink for CountingSink {
            fn accept(&mut self, _slot: FileSlot) {
                CALLS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let files: Vec<PathBuf> = (0..4).map(|i| PathBuf::from(format!("s{i}.png"))).collect();
        let sampler =
            StagedSampler::new(files.iter().map(|f| (f.clone(), marked_a())).collect());
        let config = EngineConfig {
            worker_count: 4,
            ..EngineConfig::default()
        };
        let scheduler = BatchScheduler::new(&config, &sampler);
        scheduler
            .run(&files, &test_template(), &mut CountingSink)
            .expect("batch runs");
        assert_eq!(CALLS.load(Ordering::Relaxed), 4);
    }
}
