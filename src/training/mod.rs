//! Model training module
//!
//! Provides the pieces used to train and score the classifier:
//! - K-fold and stratified k-fold splitting
//! - Brute-force K-Nearest Neighbors classification
//! - Binary classification metrics

pub mod cross_validation;
pub mod knn;
pub mod metrics;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use knn::{compute_distance, DistanceMetric, KNNClassifier, KNNConfig, SearchAlgorithm, WeightScheme};
pub use metrics::{f1_score, ClassificationMetrics, DEFAULT_POS_LABEL};
