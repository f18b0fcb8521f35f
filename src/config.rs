//! Pipeline configuration
//!
//! Defaults reproduce the tuned cross-validation run. Any field can be
//! overridden in a JSON file; missing fields keep their defaults.

use crate::decomposition::KernelPCAConfig;
use crate::error::{PipelineError, Result};
use crate::preprocessing::ScalerConfig;
use crate::training::{DistanceMetric, KNNConfig};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Input file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub features_path: PathBuf,
    pub labels_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            features_path: PathBuf::from("data/raw/train_data.csv"),
            labels_path: PathBuf::from("data/raw/train_labels.csv"),
        }
    }
}

/// Artifact and report locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub models_dir: PathBuf,
    pub scaler_file: String,
    pub reducer_file: String,
    pub classifier_file: String,
    /// Write `cv_report.json` next to the artifacts
    pub write_report: bool,
    /// Also persist every fold's artifacts under `fold_<k>/`
    pub keep_fold_artifacts: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            scaler_file: "min_max_scaler_2.bin".to_string(),
            reducer_file: "kpca_dimension_reduction_2.bin".to_string(),
            classifier_file: "knn_2.bin".to_string(),
            write_report: true,
            keep_fold_artifacts: false,
        }
    }
}

impl OutputConfig {
    pub fn scaler_path(&self) -> PathBuf {
        self.models_dir.join(&self.scaler_file)
    }

    pub fn reducer_path(&self) -> PathBuf {
        self.models_dir.join(&self.reducer_file)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.models_dir.join(&self.classifier_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.models_dir.join("cv_report.json")
    }

    /// Same file names, rooted in a per-fold subdirectory
    pub fn for_fold(&self, fold_idx: usize) -> Self {
        Self {
            models_dir: self.models_dir.join(format!("fold_{}", fold_idx)),
            write_report: false,
            keep_fold_artifacts: false,
            ..self.clone()
        }
    }
}

/// Cross-validated training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub n_splits: usize,
    pub shuffle: bool,
    /// Seed for fold shuffling and oversampling; `None` draws from entropy
    pub random_state: Option<u64>,
    pub smote_k_neighbors: usize,
    pub kpca: KernelPCAConfig,
    pub scaler: ScalerConfig,
    pub knn: KNNConfig,
    pub output: OutputConfig,
    pub parallel_folds: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            n_splits: 5,
            shuffle: true,
            random_state: Some(42),
            smote_k_neighbors: 5,
            kpca: KernelPCAConfig::new(90),
            scaler: ScalerConfig::default(),
            knn: KNNConfig::default(),
            output: OutputConfig::default(),
            parallel_folds: false,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::ConfigError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            PipelineError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_paths(mut self, features: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        self.data.features_path = features.into();
        self.data.labels_path = labels.into();
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.models_dir = dir.into();
        self
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_smote_k_neighbors(mut self, k: usize) -> Self {
        self.smote_k_neighbors = k;
        self
    }

    pub fn with_kpca(mut self, kpca: KernelPCAConfig) -> Self {
        self.kpca = kpca;
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerConfig) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_knn(mut self, knn: KNNConfig) -> Self {
        self.knn = knn;
        self
    }

    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel_folds = parallel;
        self
    }

    pub fn with_report(mut self, write_report: bool) -> Self {
        self.output.write_report = write_report;
        self
    }

    pub fn with_fold_artifacts(mut self, keep: bool) -> Self {
        self.output.keep_fold_artifacts = keep;
        self
    }

    /// Check settings that can be rejected before any data is read
    pub fn validate(&self) -> Result<()> {
        if self.n_splits < 2 {
            return Err(PipelineError::ConfigError(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.smote_k_neighbors == 0 {
            return Err(PipelineError::ConfigError(
                "smote_k_neighbors must be positive".to_string(),
            ));
        }
        if self.kpca.n_components == 0 {
            return Err(PipelineError::ConfigError(
                "kpca.n_components must be positive".to_string(),
            ));
        }
        let (lo, hi) = self.scaler.feature_range;
        if !(lo < hi) {
            return Err(PipelineError::ConfigError(format!(
                "scaler.feature_range ({}, {}) is empty",
                lo, hi
            )));
        }
        if self.knn.n_neighbors == 0 {
            return Err(PipelineError::ConfigError(
                "knn.n_neighbors must be positive".to_string(),
            ));
        }
        if let DistanceMetric::Minkowski(p) = self.knn.metric {
            if !(p.is_finite() && p >= 1.0) {
                return Err(PipelineError::ConfigError(format!(
                    "knn Minkowski order must be >= 1, got {}",
                    p
                )));
            }
        }
        let names = [
            &self.output.scaler_file,
            &self.output.reducer_file,
            &self.output.classifier_file,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(PipelineError::ConfigError(
                "artifact file names must not be empty".to_string(),
            ));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(PipelineError::ConfigError(
                "artifact file names must be distinct".to_string(),
            ));
        }
        Ok(())
    }
}
