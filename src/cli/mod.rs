// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — fits the model on a sentence-level CSV
//   2. `predict` — judges documents from a trained checkpoint

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "rob-rationale-cnn",
    version = "0.1.0",
    about = "Judge risk of bias in clinical-trial reports and surface the sentences that justify each call."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.data_path);
    let use_case = TrainUseCase::new(args.into());
    use_case.execute()?;

    println!("Training complete. Checkpoint saved.");
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir, args.top_k)?;
    let report = use_case.report(std::path::Path::new(&args.data_path), args.doc_id.as_deref())?;
    print!("{report}");
    Ok(())
}
