//! knn-pipeline - Cross-validated k-NN training
//!
//! Trains a distance-weighted k-nearest-neighbors classifier on an
//! imbalanced binary dataset and estimates its F1 score with k-fold
//! cross-validation. Every fold:
//! - oversamples the training rows with SMOTE
//! - reduces them with kernel PCA
//! - scales them to [-1, 1]
//! - fits k-NN and scores the held-out rows
//!
//! # Modules
//!
//! ## Pipeline
//! - [`pipeline`] - Per-fold training, accumulation and persistence
//! - [`config`] - Run configuration with JSON overrides
//!
//! ## Components
//! - [`synthetic`] - SMOTE oversampling
//! - [`decomposition`] - Kernel PCA
//! - [`preprocessing`] - Min-max scaling
//! - [`training`] - Fold splitting, k-NN, metrics
//!
//! ## Infrastructure
//! - [`utils`] - CSV loading
//! - [`export`] - Model serialization
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Components
pub mod synthetic;
pub mod decomposition;
pub mod preprocessing;
pub mod training;

// Orchestration
pub mod pipeline;

// Infrastructure
pub mod utils;
pub mod export;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result};

    // Configuration
    pub use crate::config::{DataConfig, OutputConfig, PipelineConfig};

    // Pipeline
    pub use crate::pipeline::{run_fold, CVReport, FittedArtifacts, FoldOutcome, Pipeline, PipelineOutput};

    // Components
    pub use crate::synthetic::{Sampler, SMOTE};
    pub use crate::decomposition::{Kernel, KernelPCA, KernelPCAConfig};
    pub use crate::preprocessing::{MinMaxScaler, ScalerConfig};
    pub use crate::training::{
        f1_score, CVResults, CVStrategy, ClassificationMetrics, CrossValidator, DistanceMetric,
        KNNClassifier, KNNConfig, WeightScheme,
    };

    // Data and export
    pub use crate::utils::{DataLoader, Dataset};
    pub use crate::export::{load_model, save_model, ModelSerializer};
}
