//! Cross-validated training pipeline
//!
//! Each fold runs oversampling, kernel PCA, min-max scaling and k-NN
//! training on its training rows, then scores the held-out rows with F1.
//! The fitted objects of the last fold are persisted once every fold has
//! succeeded.

pub mod report;

pub use report::{CVReport, FoldSummary};

use crate::config::{OutputConfig, PipelineConfig};
use crate::decomposition::KernelPCA;
use crate::error::{PipelineError, Result};
use crate::export::{commit_staged, load_model, stage_model, StagedModel};
use crate::preprocessing::MinMaxScaler;
use crate::synthetic::{Sampler, SMOTE};
use crate::training::{
    CVSplit, CVStrategy, ClassificationMetrics, CrossValidator, KNNClassifier, DEFAULT_POS_LABEL,
};
use crate::utils::{DataLoader, Dataset, Timer};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Fitted reducer, scaler and classifier of one fold
#[derive(Debug, Clone)]
pub struct FittedArtifacts {
    pub reducer: KernelPCA,
    pub scaler: MinMaxScaler,
    pub classifier: KNNClassifier,
}

impl FittedArtifacts {
    /// Apply reducer, scaler and classifier to raw feature rows
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let reduced = self.reducer.transform(x)?;
        let scaled = self.scaler.transform(&reduced)?;
        self.classifier.predict(&scaled)
    }

    /// Write the artifacts to temporary files beside their destinations
    fn stage(&self, output: &OutputConfig, staged: &mut Vec<StagedModel>) -> Result<()> {
        staged.push(stage_model(&self.scaler, output.scaler_path())?);
        staged.push(stage_model(&self.reducer, output.reducer_path())?);
        staged.push(stage_model(&self.classifier, output.classifier_path())?);
        Ok(())
    }

    /// Read the three artifacts from `output.models_dir`
    pub fn load(output: &OutputConfig) -> Result<Self> {
        Ok(Self {
            scaler: load_model(output.scaler_path())?,
            reducer: load_model(output.reducer_path())?,
            classifier: load_model(output.classifier_path())?,
        })
    }
}

/// Result of running one fold
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub summary: FoldSummary,
    pub artifacts: FittedArtifacts,
}

impl FoldOutcome {
    pub fn fold_idx(&self) -> usize {
        self.summary.fold_idx
    }

    pub fn f1_score(&self) -> f64 {
        self.summary.metrics.f1_score
    }
}

/// Collects fitted artifacts as folds finish.
///
/// Holds the most recent fold's artifacts, plus every earlier fold's when
/// per-fold storage is requested. Nothing touches the disk until
/// [`ArtifactAccumulator::persist`].
#[derive(Debug, Default)]
pub struct ArtifactAccumulator {
    keep_all: bool,
    last: Option<(usize, FittedArtifacts)>,
    history: Vec<(usize, FittedArtifacts)>,
}

impl ArtifactAccumulator {
    pub fn new(keep_all: bool) -> Self {
        Self {
            keep_all,
            ..Default::default()
        }
    }

    pub fn record(&mut self, fold_idx: usize, artifacts: FittedArtifacts) {
        if let Some(previous) = self.last.replace((fold_idx, artifacts)) {
            if self.keep_all {
                self.history.push(previous);
            }
        }
    }

    pub fn last(&self) -> Option<&FittedArtifacts> {
        self.last.as_ref().map(|(_, a)| a)
    }

    /// Write the last fold's artifacts, and per-fold copies when kept.
    ///
    /// Every file is staged before any destination is replaced, so a failed
    /// write leaves earlier artifacts in place.
    pub fn persist(self, output: &OutputConfig) -> Result<(FittedArtifacts, Vec<PathBuf>)> {
        let (last_idx, last) = self.last.ok_or_else(|| {
            PipelineError::ValidationError("No fold produced fitted artifacts".to_string())
        })?;

        let written = {
            let mut targets = vec![(&last, output.clone())];
            if self.keep_all {
                for (fold_idx, artifacts) in &self.history {
                    targets.push((artifacts, output.for_fold(*fold_idx)));
                }
                targets.push((&last, output.for_fold(last_idx)));
            }

            let mut staged = Vec::with_capacity(targets.len() * 3);
            for (artifacts, target) in &targets {
                if let Err(e) = artifacts.stage(target, &mut staged) {
                    staged.into_iter().for_each(StagedModel::discard);
                    return Err(e);
                }
            }
            commit_staged(staged)?
        };
        Ok((last, written))
    }
}

/// Everything a completed run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub report: CVReport,
    pub artifacts: FittedArtifacts,
    /// Files written by the run, artifacts first
    pub written: Vec<PathBuf>,
}

/// Train and score one fold.
///
/// Reads `x` and `y` without modifying them and returns freshly fitted
/// objects, so folds are independent of each other.
pub fn run_fold(
    x: &Array2<f64>,
    y: &Array1<i64>,
    split: &CVSplit,
    config: &PipelineConfig,
) -> Result<FoldOutcome> {
    let timer = Timer::start();
    let fold_idx = split.fold_idx;

    let x_train = x.select(Axis(0), &split.train_indices);
    let y_train = y.select(Axis(0), &split.train_indices);
    let x_test = x.select(Axis(0), &split.test_indices);
    let y_test = y.select(Axis(0), &split.test_indices);

    println!("Sampling ...");
    let mut sampler = SMOTE::new()
        .with_k_neighbors(config.smote_k_neighbors)
        .with_optional_seed(config.random_state.map(|s| s.wrapping_add(fold_idx as u64)));
    let resampled = sampler.fit_resample(&x_train, &y_train)?;
    debug!(
        fold = fold_idx,
        before = x_train.nrows(),
        after = resampled.x.nrows(),
        "Training fold oversampled"
    );

    println!("Dimension reduction ...");
    let mut reducer = KernelPCA::new(config.kpca.clone());
    let train_reduced = reducer.fit_transform(&resampled.x, Some(&resampled.y))?;
    let test_reduced = reducer.transform(&x_test)?;

    println!("Min Max Scaler ...");
    let mut scaler = MinMaxScaler::new(config.scaler.clone());
    let train_scaled = scaler.fit_transform(&train_reduced)?;
    let test_scaled = scaler.transform(&test_reduced)?;

    println!("Training model ...");
    let mut classifier = KNNClassifier::new(config.knn.clone());
    classifier.fit(&train_scaled, &resampled.y)?;

    let y_pred = classifier.predict(&test_scaled)?;
    let metrics = ClassificationMetrics::compute_binary(&y_test, &y_pred, DEFAULT_POS_LABEL)?;

    info!(
        fold = fold_idx,
        f1 = metrics.f1_score,
        n_train = x_train.nrows(),
        n_test = x_test.nrows(),
        elapsed_ms = timer.elapsed_ms(),
        "Fold complete"
    );

    Ok(FoldOutcome {
        summary: FoldSummary {
            fold_idx,
            n_train: x_train.nrows(),
            n_train_resampled: resampled.x.nrows(),
            n_synthetic: resampled.total_synthetic(),
            n_test: x_test.nrows(),
            metrics,
            elapsed_ms: timer.elapsed_ms(),
        },
        artifacts: FittedArtifacts {
            reducer,
            scaler,
            classifier,
        },
    })
}

/// Cross-validated training run
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the configured feature and label files
    pub fn load_data(&self) -> Result<Dataset> {
        DataLoader::new().load_dataset(&self.config.data.features_path, &self.config.data.labels_path)
    }

    /// Load the configured files and run
    pub fn run_from_files(&self) -> Result<PipelineOutput> {
        let dataset = self.load_data()?;
        self.run(&dataset.x, &dataset.y)
    }

    /// Run every fold, then persist artifacts and the report
    pub fn run(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<PipelineOutput> {
        let timer = Timer::start();
        let outcomes = self.cross_validate(x, y)?;

        let mut summaries = Vec::with_capacity(outcomes.len());
        let mut accumulator = ArtifactAccumulator::new(self.config.output.keep_fold_artifacts);
        for outcome in outcomes {
            accumulator.record(outcome.fold_idx(), outcome.artifacts);
            summaries.push(outcome.summary);
        }

        let report = CVReport::new(x.nrows(), x.ncols(), summaries);
        report.print_scores();

        let output = &self.config.output;
        let (artifacts, mut written) = accumulator.persist(output)?;
        if output.write_report {
            let path = output.report_path();
            report.write_json(&path)?;
            written.push(path);
        }

        info!(
            mean_f1 = report.mean_score(),
            std_f1 = report.results.std_score,
            models_dir = %output.models_dir.display(),
            elapsed_ms = timer.elapsed_ms(),
            "Cross-validation finished"
        );

        Ok(PipelineOutput {
            report,
            artifacts,
            written,
        })
    }

    /// Run every fold without writing anything; outcomes are in fold order
    pub fn cross_validate(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<Vec<FoldOutcome>> {
        if x.nrows() != y.len() {
            return Err(PipelineError::shape(
                format!("{} labels", x.nrows()),
                format!("{} labels", y.len()),
            ));
        }

        let splits = CrossValidator::new(CVStrategy::KFold {
            n_splits: self.config.n_splits,
            shuffle: self.config.shuffle,
        })
        .with_optional_random_state(self.config.random_state)
        .split(x.nrows(), Some(y))?;

        info!(
            folds = splits.len(),
            rows = x.nrows(),
            features = x.ncols(),
            parallel = self.config.parallel_folds,
            "Starting cross-validation"
        );

        let mut outcomes = if self.config.parallel_folds {
            splits
                .par_iter()
                .map(|split| run_fold(x, y, split, &self.config))
                .collect::<Result<Vec<_>>>()?
        } else {
            splits
                .iter()
                .map(|split| run_fold(x, y, split, &self.config))
                .collect::<Result<Vec<_>>>()?
        };
        outcomes.sort_by_key(FoldOutcome::fold_idx);
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::KernelPCAConfig;
    use tempfile::TempDir;

    /// Two noisy clusters, 3:1 class ratio
    fn clustered_data(n: usize, n_features: usize) -> (Array2<f64>, Array1<i64>) {
        let y = Array1::from_shape_fn(n, |i| if i % 4 == 0 { 1i64 } else { 0 });
        let x = Array2::from_shape_fn((n, n_features), |(i, j)| {
            let center = if y[i] == 1 { 2.0 } else { -2.0 };
            center + ((i * 31 + j * 17) as f64).sin()
        });
        (x, y)
    }

    fn small_config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig::default()
            .with_models_dir(dir.path())
            .with_kpca(KernelPCAConfig::new(4))
            .with_n_splits(3)
    }

    #[test]
    fn test_run_fold_shapes() {
        let (x, y) = clustered_data(96, 6);
        let dir = TempDir::new().unwrap();
        let config = small_config(&dir);
        let splits = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true })
            .with_random_state(1)
            .split(96, Some(&y))
            .unwrap();

        let outcome = run_fold(&x, &y, &splits[0], &config).unwrap();
        assert_eq!(outcome.summary.n_train, 64);
        assert_eq!(outcome.summary.n_test, 32);
        assert_eq!(outcome.summary.n_synthetic, 32);
        assert_eq!(
            outcome.summary.n_train_resampled,
            outcome.summary.n_train + outcome.summary.n_synthetic
        );
        assert_eq!(outcome.artifacts.reducer.n_components(), 4);
        assert!((0.0..=1.0).contains(&outcome.f1_score()));
    }

    #[test]
    fn test_accumulator_keeps_last() {
        let (x, y) = clustered_data(96, 6);
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(small_config(&dir)).unwrap();
        let outcomes = pipeline.cross_validate(&x, &y).unwrap();

        let mut acc = ArtifactAccumulator::new(false);
        for outcome in outcomes {
            acc.record(outcome.fold_idx(), outcome.artifacts);
        }
        assert!(acc.last().is_some());
        assert!(acc.history.is_empty());

        let (_, written) = acc.persist(&pipeline.config().output).unwrap();
        assert_eq!(written.len(), 3);
    }

    #[test]
    fn test_failed_write_keeps_previous_artifacts() {
        let (x, y) = clustered_data(96, 6);
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(small_config(&dir)).unwrap();
        let output = &pipeline.config().output;

        let mut acc = ArtifactAccumulator::new(false);
        for outcome in pipeline.cross_validate(&x, &y).unwrap() {
            acc.record(outcome.fold_idx(), outcome.artifacts);
        }

        // The scaler could be written but the reducer cannot
        std::fs::write(output.scaler_path(), b"previous").unwrap();
        std::fs::create_dir_all(output.reducer_path().with_extension("tmp")).unwrap();

        assert!(acc.persist(output).is_err());
        assert_eq!(std::fs::read(output.scaler_path()).unwrap(), b"previous");
        assert!(!output.scaler_path().with_extension("tmp").exists());
        assert!(!output.classifier_path().exists());
    }

    #[test]
    fn test_empty_accumulator_fails() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig {
            models_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(ArtifactAccumulator::new(true).persist(&output).is_err());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y) = clustered_data(96, 6);
        let dir = TempDir::new().unwrap();

        let seq = Pipeline::new(small_config(&dir)).unwrap();
        let par = Pipeline::new(small_config(&dir).with_parallel_folds(true)).unwrap();

        let a: Vec<f64> = seq.cross_validate(&x, &y).unwrap().iter().map(|o| o.f1_score()).collect();
        let b: Vec<f64> = par.cross_validate(&x, &y).unwrap().iter().map(|o| o.f1_score()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_label_mismatch() {
        let (x, _) = clustered_data(96, 6);
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(small_config(&dir)).unwrap();
        let err = pipeline.cross_validate(&x, &Array1::zeros(10)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeError { .. }));
    }
}
