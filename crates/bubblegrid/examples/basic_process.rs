use bubblegrid::{BatchScheduler, EngineConfig, GraySampler, MemorySink, SheetTemplate};
use std::error::Error;
use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <template.json> <sheet.png>...", args[0]);
        std::process::exit(2);
    }

    let template = SheetTemplate::from_json_file(Path::new(&args[1]))?;
    let images: Vec<PathBuf> = args[2..].iter().map(PathBuf::from).collect();

    let config = EngineConfig::default();
    let sampler = GraySampler;
    let scheduler = BatchScheduler::new(&config, &sampler);
    let mut sink = MemorySink::new();
    let summary = scheduler.run(&images, &template, &mut sink)?;

    for slot in &sink.slots {
        match &slot.outcome {
            Ok(result) => println!(
                "[{}] {}: {:?}",
                slot.input_index,
                slot.path.display(),
                result.response
            ),
            Err(err) => println!(
                "[{}] {}: FAILED: {err}",
                slot.input_index,
                slot.path.display()
            ),
        }
    }
    println!(
        "{} files, {} ok, {} failed",
        summary.total_files, summary.counters.files_processed, summary.counters.files_failed
    );
    Ok(())
}
