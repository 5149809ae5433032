// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application); this layer
// only routes and prints results.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, StarspaceArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mimic-han",
    version,
    about = "Predict billing codes from discharge notes with hierarchical attention networks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Evaluate(args)  => run_evaluate(args),
            Commands::Predict(args)   => run_predict(args),
            Commands::Starspace(args) => run_starspace(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on notes in: {}", args.train_path);

    let use_case = TrainUseCase::new(args.into());
    let summary  = use_case.run()?;

    println!(
        "Training complete: {} epochs, {} steps. Best validation loss {:.4} at epoch {}.",
        summary.epochs, summary.steps, summary.best_val_loss, summary.best_epoch
    );
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let choice   = args.checkpoint.choice();
    let use_case = EvaluateUseCase::new(args.checkpoint.run_dir, args.data_path, choice, args.checkpoint.backend);
    let report   = use_case.run()?;

    println!("Notes:     {}", report.samples);
    println!("Loss:      {:.4}", report.loss);
    println!("Accuracy:  {:.2}%", report.scores.accuracy * 100.0);
    println!("Precision: {:.4}", report.scores.precision);
    println!("Recall:    {:.4}", report.scores.recall);
    println!("F1:        {:.4}", report.scores.f1);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let choice     = args.checkpoint.choice();
    let to_stdout  = args.output.is_none();
    let use_case   = PredictUseCase::new(
        args.checkpoint.run_dir,
        args.data_path,
        args.output,
        args.top_k,
        choice,
        args.checkpoint.backend,
    );
    let predictions = use_case.run()?;

    if to_stdout {
        for p in &predictions {
            println!("{}", serde_json::to_string(p)?);
        }
    }
    Ok(())
}

fn run_starspace(args: StarspaceArgs) -> Result<()> {
    use crate::application::starspace_use_case::StarspaceUseCase;

    let output   = args.output.clone();
    let use_case = StarspaceUseCase::new(args.train_path, args.output, args.exec, args.exec_args);
    let written  = use_case.execute()?;

    println!("Wrote {} notes to '{}'", written, output.display());
    Ok(())
}
