// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
//   1. `train`       trains a model, writes a run directory
//   2. `evaluate`    reloads a run and scores every split
//   3. `precompute`  fills the positional-encoding cache
//   4. `inspect`     prints dataset statistics
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, DatasetArgs, EvaluateArgs, TrainArgs};

/// The main CLI struct. clap reads the fields and generates the
/// argument parsing code via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "graph-bench",
    version,
    about = "Train and evaluate message-passing and graph-transformer models on graph benchmarks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Precompute(args) => run_precompute(args),
            Commands::Inspect(args) => run_inspect(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.into_config()?;
    tracing::info!("Starting training on '{}'", config.dataset.name);
    let report = TrainUseCase::new(config).execute()?;

    match report.best_epoch {
        Some(epoch) => println!("Training complete. Best epoch: {epoch}"),
        None => println!("Training complete."),
    }
    println!("Test loss: {:.4}", report.test.loss);
    for (name, value) in &report.test.metrics {
        println!("Test {name}: {value:.4}");
    }
    println!("Outputs in {}", report.run_dir.display());
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let results = EvaluateUseCase::new(&args.run_dir).execute()?;
    for (split, stats) in results {
        let metrics: Vec<String> = stats.metrics.iter().map(|(k, v)| format!("{k}={v:.4}")).collect();
        println!("{split:<5} loss={:.4} {}", stats.loss, metrics.join(" "));
    }
    Ok(())
}

fn run_precompute(args: DatasetArgs) -> Result<()> {
    use crate::application::dataset_use_case::DatasetUseCase;

    let cached = DatasetUseCase::new(args.into_config()?).precompute()?;
    println!("{}", if cached { "Encodings already cached." } else { "Encodings computed and cached." });
    Ok(())
}

fn run_inspect(args: DatasetArgs) -> Result<()> {
    use crate::application::dataset_use_case::DatasetUseCase;

    let stats = DatasetUseCase::new(args.into_config()?).inspect()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
