//! K-Nearest Neighbors classifier
//!
//! Brute-force neighbor search with configurable distance metric and
//! uniform or inverse-distance voting.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{PipelineError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
    /// Cosine similarity (converted to distance)
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

/// Neighbor search algorithm.
///
/// Only exhaustive search is implemented; `leaf_size` is carried for tree
/// based searches and has no effect here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchAlgorithm {
    Brute,
}

/// Minkowski order found by hyperparameter search
pub const TUNED_MINKOWSKI_P: f64 = 3.198659538429792;

/// KNN configuration.
///
/// Defaults are the tuned settings: 7 neighbors, inverse-distance votes and
/// the Manhattan metric. The tuned order [`TUNED_MINKOWSKI_P`] is kept in `p`
/// but only `DistanceMetric::Minkowski` carries an order, so it has no effect
/// on Manhattan distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Neighbor search algorithm
    pub algorithm: SearchAlgorithm,
    /// Leaf size for tree searches
    pub leaf_size: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Minkowski order recorded by the search; unused by the other metrics
    pub p: f64,
    /// Weighting scheme
    pub weights: WeightScheme,
    /// 1 searches on the calling thread, any other value uses the rayon pool
    pub n_jobs: usize,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 7,
            algorithm: SearchAlgorithm::Brute,
            leaf_size: 39,
            metric: DistanceMetric::Manhattan,
            p: TUNED_MINKOWSKI_P,
            weights: WeightScheme::Distance,
            n_jobs: 1,
        }
    }
}

impl KNNConfig {
    fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(PipelineError::invalid_parameter(
                "n_neighbors",
                self.n_neighbors,
                "must be positive",
            ));
        }
        if let DistanceMetric::Minkowski(p) = self.metric {
            if !(p.is_finite() && p >= 1.0) {
                return Err(PipelineError::invalid_parameter(
                    "p",
                    p,
                    "Minkowski order must be a finite value >= 1",
                ));
            }
        }
        Ok(())
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<i64>>,
    classes: Vec<i64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    /// Feature count seen during fit
    pub fn n_features_in(&self) -> Option<usize> {
        self.x_train.as_ref().map(|x| x.ncols())
    }

    /// Sorted distinct labels seen during fit
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        if x.nrows() != y.len() {
            return Err(PipelineError::shape(
                format!("{} labels", x.nrows()),
                format!("{} labels", y.len()),
            ));
        }
        if x.nrows() < self.config.n_neighbors {
            return Err(PipelineError::invalid_parameter(
                "n_neighbors",
                self.config.n_neighbors,
                format!("exceeds the {} training samples", x.nrows()),
            ));
        }

        let mut classes: Vec<i64> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();

        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        self.classes = classes;

        Ok(())
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let weights = self.config.weights;
        let classes = &self.classes;
        let labels = self.map_rows(x, |neighbors| {
            let votes = class_votes(neighbors, classes, weights);
            // Strict comparison keeps the smallest label on ties
            let mut best = 0;
            for (i, &v) in votes.iter().enumerate() {
                if v > votes[best] {
                    best = i;
                }
            }
            classes[best]
        })?;
        Ok(Array1::from_vec(labels))
    }

    /// Predict class probabilities, columns ordered as [`Self::classes`]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self.config.weights;
        let classes = &self.classes;
        let rows = self.map_rows(x, |neighbors| {
            let mut votes = class_votes(neighbors, classes, weights);
            let total: f64 = votes.iter().sum();
            if total > 0.0 {
                votes.iter_mut().for_each(|v| *v /= total);
            }
            votes
        })?;

        let n_classes = classes.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }

    /// Run `f` over the k nearest neighbors of every query row
    fn map_rows<T, F>(&self, x: &Array2<f64>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&[Neighbor]) -> T + Sync,
    {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(PipelineError::ModelNotFitted),
        };
        if x.ncols() != x_train.ncols() {
            return Err(PipelineError::shape(
                format!("{} features", x_train.ncols()),
                format!("{} features", x.ncols()),
            ));
        }

        let k = self.config.n_neighbors;
        let metric = self.config.metric;
        let query = |i: usize| {
            let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
            f(&neighbors)
        };

        let out = if self.config.n_jobs == 1 {
            (0..x.nrows()).map(query).collect()
        } else {
            (0..x.nrows()).into_par_iter().map(query).collect()
        };
        Ok(out)
    }
}

/// A training row found near a query point
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f64,
    label: i64,
}

/// Max-heap entry keyed by distance, then row index for stable ties
#[derive(PartialEq)]
struct DistIdx(f64, usize);

impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// k nearest training rows, closest first, using a bounded max-heap
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<i64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let entry = DistIdx(compute_distance(point, row, metric), i);
        if heap.len() < k {
            heap.push(entry);
        } else if let Some(top) = heap.peek() {
            if entry < *top {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|DistIdx(dist, i)| Neighbor { dist, label: y_train[i] })
        .collect()
}

/// Compute distance between two points using the specified metric
pub fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
        DistanceMetric::Cosine => {
            let mut dot = 0.0;
            let mut norm_a = 0.0;
            let mut norm_b = 0.0;
            for (ai, bi) in a.iter().zip(b.iter()) {
                dot += ai * bi;
                norm_a += ai * ai;
                norm_b += bi * bi;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 { 1.0 - (dot / denom) } else { 1.0 }
        }
    }
}

/// Accumulate per-class vote weights, indexed like `classes`.
///
/// Under distance weighting an exact match takes the whole vote: only
/// zero-distance neighbors count, with weight 1 each.
fn class_votes(neighbors: &[Neighbor], classes: &[i64], weights: WeightScheme) -> Vec<f64> {
    let exact_match = weights == WeightScheme::Distance && neighbors.iter().any(|n| n.dist == 0.0);

    let mut votes = vec![0.0; classes.len()];
    for n in neighbors {
        let weight = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance if exact_match => {
                if n.dist == 0.0 { 1.0 } else { 0.0 }
            }
            WeightScheme::Distance => 1.0 / n.dist,
        };
        if let Ok(idx) = classes.binary_search(&n.label) {
            votes[idx] += weight;
        }
    }
    votes
}
