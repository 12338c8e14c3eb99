//! bubblegrid CLI — batch interpretation of scanned answer sheets.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use bubblegrid::{
    BatchScheduler, EngineConfig, FileResult, FileSlot, GraySampler, LocalThreshold, MemorySink,
    SheetTemplate, ThresholdStrategy,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "bubblegrid")]
#[command(about = "Detect and interpret marked bubbles on scanned answer sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch of sheet images against a template.
    Process(CliProcessArgs),

    /// Print template statistics.
    TemplateInfo {
        /// Path to the template JSON.
        #[arg(long)]
        template: PathBuf,
    },

    /// Run the local threshold strategy on a comma-separated intensity list.
    ThresholdTest {
        /// Intensities in [0, 255], e.g. "40,210,215,220".
        #[arg(long)]
        values: String,

        /// File-wide fallback threshold to assume.
        #[arg(long, default_value = "127.5")]
        global_fallback: f32,
    },
}

#[derive(Debug, Clone, Args)]
struct CliProcessArgs {
    /// Sheet images to process; output keeps this order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Path to the template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Path to write per-file results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Worker pool size (1 forces sequential processing).
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Minimum meaningful intensity gap between marked and unmarked clusters.
    #[arg(long)]
    min_jump: Option<f32>,

    /// Minimum gap required to trust a local split on two-bubble fields.
    #[arg(long)]
    min_gap_two_bubbles: Option<f32>,

    /// Extra jump beyond --min-jump required for a confident local threshold.
    #[arg(long)]
    min_jump_surplus: Option<f32>,

    /// Field std-deviation below this counts as outlier-free for fallback.
    #[arg(long)]
    outlier_deviation_threshold: Option<f32>,
}

/// Per-file output record: either the interpretation or the failure reason.
#[derive(serde::Serialize)]
struct SheetRecord {
    input_index: usize,
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<FileResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<FileSlot> for SheetRecord {
    fn from(slot: FileSlot) -> Self {
        let file = slot.path.display().to_string();
        match slot.outcome {
            Ok(result) => Self {
                input_index: slot.input_index,
                file,
                result: Some(result),
                error: None,
            },
            Err(err) => Self {
                input_index: slot.input_index,
                file,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

fn build_config(args: &CliProcessArgs) -> EngineConfig {
    let mut config = EngineConfig {
        worker_count: args.workers,
        ..EngineConfig::default()
    };
    if let Some(v) = args.min_jump {
        config.threshold.min_jump = v;
    }
    if let Some(v) = args.min_gap_two_bubbles {
        config.threshold.min_gap_two_bubbles = v;
    }
    if let Some(v) = args.min_jump_surplus {
        config.threshold.min_jump_surplus = v;
    }
    if let Some(v) = args.outlier_deviation_threshold {
        config.threshold.outlier_deviation_threshold = v;
    }
    config
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => run_process(&args),
        Commands::TemplateInfo { template } => run_template_info(&template),
        Commands::ThresholdTest {
            values,
            global_fallback,
        } => run_threshold_test(&values, global_fallback),
    }
}

// ── process ────────────────────────────────────────────────────────────

fn run_process(args: &CliProcessArgs) -> CliResult<()> {
    let config = build_config(args);
    tracing::info!("Loading template: {}", args.template.display());
    let template = SheetTemplate::from_json_file(&args.template)?;
    tracing::info!(
        "Template {:?}: {} fields, {} bubbles",
        template.name,
        template.n_fields(),
        template.n_bubbles()
    );

    let sampler = GraySampler;
    let scheduler = BatchScheduler::new(&config, &sampler);
    let mut sink = MemorySink::new();
    let summary = scheduler.run(&args.images, &template, &mut sink)?;

    let records: Vec<SheetRecord> = sink.slots.into_iter().map(SheetRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(&args.out, json)?;

    tracing::info!(
        "Processed {} files ({} ok, {} failed, {} multi-marked)",
        summary.total_files,
        summary.counters.files_processed,
        summary.counters.files_failed,
        summary.counters.files_multi_marked
    );
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

// ── template-info ──────────────────────────────────────────────────────

fn run_template_info(path: &std::path::Path) -> CliResult<()> {
    let template = SheetTemplate::from_json_file(path)?;

    println!("template {:?}", template.name);
    println!("  schema:   {}", template.schema);
    println!("  fields:   {}", template.n_fields());
    println!("  bubbles:  {}", template.n_bubbles());
    for field in &template.fields {
        let options: Vec<&str> = field.bubbles.iter().map(|b| b.value.as_str()).collect();
        println!("  {:<12} [{}]", field.label, options.join(", "));
    }
    Ok(())
}

// ── threshold-test ─────────────────────────────────────────────────────

fn run_threshold_test(values_str: &str, global_fallback: f32) -> CliResult<()> {
    let values: Vec<f32> = values_str
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| -> CliError { format!("invalid intensity {v:?}: {e}").into() })
        })
        .collect::<Result<_, _>>()?;

    let config = EngineConfig::default();
    let strategy = LocalThreshold { global_fallback };
    let result = strategy.calculate(&values, &config.threshold);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
