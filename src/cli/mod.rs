//! Command-line interface
//!
//! `train` runs cross-validated training and writes the fitted artifacts;
//! `predict` loads them back and labels new rows.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{OutputConfig, PipelineConfig};
use crate::pipeline::{FittedArtifacts, Pipeline};
use crate::utils::{save_predictions, DataLoader};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "knn-pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated SMOTE + kernel PCA + k-NN training")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run cross-validated training and save the fitted artifacts (default)
    Train(TrainArgs),

    /// Label new rows with previously saved artifacts
    Predict(PredictArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PredictArgs {
    /// Feature CSV with the same columns used in training
    #[arg(short, long)]
    pub data: PathBuf,

    /// JSON configuration used for training; supplies the artifact file names
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the saved artifacts [default: models]
    #[arg(short, long)]
    pub models_dir: Option<PathBuf>,

    /// Write predictions to this CSV instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PredictArgs {
    /// Artifact locations: the config file's output section (or defaults), then `--models-dir`
    pub fn to_output(&self) -> anyhow::Result<OutputConfig> {
        let mut output = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?.output,
            None => OutputConfig::default(),
        };
        if let Some(dir) = &self.models_dir {
            output.models_dir = dir.clone();
        }
        Ok(output)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature CSV
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Label CSV (single column)
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// Output directory for artifacts and report
    #[arg(short, long)]
    pub models_dir: Option<PathBuf>,

    /// Random seed for fold shuffling and oversampling
    #[arg(long, conflicts_with = "no_seed")]
    pub seed: Option<u64>,

    /// Draw randomness from the OS instead of a fixed seed
    #[arg(long)]
    pub no_seed: bool,

    /// Run folds on the rayon thread pool
    #[arg(long)]
    pub parallel_folds: bool,

    /// Also save every fold's artifacts under fold_<k>/
    #[arg(long)]
    pub keep_fold_artifacts: bool,

    /// Skip writing cv_report.json
    #[arg(long)]
    pub no_report: bool,
}

impl TrainArgs {
    /// Resolve the run configuration: file (or defaults), then flags
    pub fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(data) = &self.data {
            config.data.features_path = data.clone();
        }
        if let Some(labels) = &self.labels {
            config.data.labels_path = labels.clone();
        }
        if let Some(dir) = &self.models_dir {
            config.output.models_dir = dir.clone();
        }
        if self.no_seed {
            config.random_state = None;
        } else if let Some(seed) = self.seed {
            config.random_state = Some(seed);
        }
        if self.parallel_folds {
            config.parallel_folds = true;
        }
        if self.keep_fold_artifacts {
            config.output.keep_fold_artifacts = true;
        }
        if self.no_report {
            config.output.write_report = false;
        }

        config.validate()?;
        Ok(config)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(args: &TrainArgs) -> anyhow::Result<()> {
    let config = args.to_config()?;
    let pipeline = Pipeline::new(config)?;

    section("Train");
    step_run("Loading data");
    let start = Instant::now();
    let dataset = pipeline.load_data()?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        start.elapsed()
    ));
    println!();

    let start = Instant::now();
    let output = pipeline.run(&dataset.x, &dataset.y)?;

    section("Cross-validation");
    for fold in &output.report.folds {
        kv(
            &format!("Fold {}", fold.fold_idx),
            &format!(
                "F1 {:.4}  ({} train → {} resampled, {} test)",
                fold.metrics.f1_score, fold.n_train, fold.n_train_resampled, fold.n_test
            ),
        );
    }
    println!();
    println!(
        "  {:<16} {}",
        muted("Mean F1"),
        format!("{:.4}", output.report.mean_score()).white().bold()
    );
    kv("Std F1", &format!("{:.4}", output.report.results.std_score));
    kv("Time", &format!("{:.3}s", start.elapsed().as_secs_f64()));

    section("Artifacts");
    for path in &output.written {
        step_ok(&path.display().to_string());
    }
    println!();

    Ok(())
}

pub fn cmd_predict(args: &PredictArgs) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading artifacts");
    let start = Instant::now();
    let artifacts = FittedArtifacts::load(&args.to_output()?)?;
    step_done(&format!("{:?}", start.elapsed()));

    step_run("Loading data");
    let (x, _) = DataLoader::new().load_features(&args.data)?;
    step_done(&format!("{} rows × {} cols", x.nrows(), x.ncols()));

    step_run("Predicting");
    let predictions = artifacts.predict(&x)?;
    step_done(&format!("{} rows", predictions.len()));

    match &args.output {
        Some(path) => {
            let written = save_predictions(path, &predictions)?;
            step_ok(&format!("Predictions written to {}", written.display()));
        }
        None => {
            println!();
            for label in predictions.iter() {
                println!("{}", label);
            }
        }
    }
    println!();

    Ok(())
}
