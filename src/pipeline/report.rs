//! Cross-validation reporting

use crate::error::{PipelineError, Result};
use crate::training::{CVResults, ClassificationMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Per-fold numbers, without the fitted models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold_idx: usize,
    /// Training rows before oversampling
    pub n_train: usize,
    /// Training rows after oversampling
    pub n_train_resampled: usize,
    pub n_synthetic: usize,
    pub n_test: usize,
    pub metrics: ClassificationMetrics,
    pub elapsed_ms: u64,
}

/// Scores of one cross-validated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVReport {
    pub created_at: DateTime<Utc>,
    pub n_samples: usize,
    pub n_features: usize,
    pub results: CVResults,
    pub folds: Vec<FoldSummary>,
}

impl CVReport {
    /// Build a report from fold summaries in fold order
    pub fn new(n_samples: usize, n_features: usize, folds: Vec<FoldSummary>) -> Self {
        let scores = folds.iter().map(|f| f.metrics.f1_score).collect();
        Self {
            created_at: Utc::now(),
            n_samples,
            n_features,
            results: CVResults::from_scores(scores),
            folds,
        }
    }

    pub fn scores(&self) -> &[f64] {
        &self.results.scores
    }

    pub fn mean_score(&self) -> f64 {
        self.results.mean_score
    }

    /// Score list on one line, then the mean on the next
    pub fn score_lines(&self) -> (String, String) {
        let scores: Vec<String> = self.results.scores.iter().map(|s| s.to_string()).collect();
        (format!("[{}]", scores.join(", ")), self.results.mean_score.to_string())
    }

    /// Print the score list and its mean to stdout
    pub fn print_scores(&self) {
        let (scores, mean) = self.score_lines();
        println!("{}", scores);
        println!("{}", mean);
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path).map_err(|e| {
            PipelineError::DataError(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
