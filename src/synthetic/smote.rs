//! SMOTE (Synthetic Minority Over-sampling Technique)

use crate::error::{PipelineError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
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

/// SMOTE sampler.
///
/// Every class is raised to the majority class count. A synthetic row lies
/// on the segment between a random class member and one of its
/// `k_neighbors` nearest same-class neighbors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Random seed
    seed: Option<u64>,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    /// Create new SMOTE sampler
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: None,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set or clear the random seed
    pub fn with_optional_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Euclidean distance
    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest same-class neighbors of every member, by position in `members`
    fn neighbor_table(&self, x: &Array2<f64>, members: &[usize]) -> Vec<Vec<usize>> {
        let k = self.k_neighbors;
        members
            .iter()
            .enumerate()
            .map(|(pos, &row)| {
                let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
                for (other_pos, &other_row) in members.iter().enumerate() {
                    if other_pos == pos {
                        continue;
                    }
                    let entry = DistIdx(Self::distance(x.row(row), x.row(other_row)), other_pos);
                    if heap.len() < k {
                        heap.push(entry);
                    } else if let Some(top) = heap.peek() {
                        if entry < *top {
                            heap.pop();
                            heap.push(entry);
                        }
                    }
                }
                heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
            })
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::shape(
                format!("{} labels", x.nrows()),
                format!("{} labels", y.len()),
            ));
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(PipelineError::ValidationError(
                "Need at least 2 classes for SMOTE".to_string(),
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        for (&class, &count) in &counts {
            if count < max_count && count <= self.k_neighbors {
                return Err(PipelineError::ValidationError(format!(
                    "Class {} has {} samples, SMOTE needs more than k_neighbors = {}",
                    class, count, self.k_neighbors
                )));
            }
        }

        self.target_counts = Some(counts.keys().map(|&class| (class, max_count)).collect());
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or(PipelineError::ModelNotFitted)?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        for (&class, &target_count) in targets {
            let members = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let n_to_generate = target_count.saturating_sub(members.len());
            n_synthetic.insert(class, n_to_generate);

            if n_to_generate == 0 {
                continue;
            }
            if members.len() <= self.k_neighbors {
                return Err(PipelineError::ValidationError(format!(
                    "Class {} has {} samples, SMOTE needs more than k_neighbors = {}",
                    class,
                    members.len(),
                    self.k_neighbors
                )));
            }

            let neighbors = self.neighbor_table(x, members);
            for _ in 0..n_to_generate {
                let pos = rng.gen_range(0..members.len());
                let neighbor_pos = neighbors[pos][rng.gen_range(0..neighbors[pos].len())];
                let gap: f64 = rng.gen();

                let sample = x.row(members[pos]);
                let neighbor = x.row(members[neighbor_pos]);
                synthetic.extend(
                    sample
                        .iter()
                        .zip(neighbor.iter())
                        .map(|(&p, &n)| p + gap * (n - p)),
                );
                synthetic_y.push(class);
            }

            debug!(class, generated = n_to_generate, "SMOTE generated synthetic rows");
        }

        let n_original = x.nrows();
        let n_new = synthetic_y.len();
        let synthetic_x = Array2::from_shape_vec((n_new, n_features), synthetic)?;
        let result_x = Array2::from_shape_fn((n_original + n_new, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[[i - n_original, j]]
            }
        });

        let mut all_y: Vec<i64> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // Imbalanced dataset: 20 majority, 8 minority
        let mut data = Vec::new();
        let mut labels = Vec::new();

        // Majority class (0) around (0, 0)
        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }

        // Minority class (1) around (10, 10)
        for i in 0..8 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        let x = Array2::from_shape_vec((28, 2), data).unwrap();
        let y = Array1::from_vec(labels);

        (x, y)
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        assert_eq!(result.x.nrows(), 40);
        assert_eq!(result.y.len(), 40);

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic[&1], 12);
        assert_eq!(result.total_synthetic(), 12);
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_synthetic_rows_stay_in_minority_hull() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in x.nrows()..result.x.nrows() {
            assert_eq!(result.y[i], 1);
            assert!((10.0..=12.0).contains(&result.x[[i, 0]]));
            assert!((10.0..=12.0).contains(&result.x[[i, 1]]));
        }
    }

    #[test]
    fn test_smote_is_seeded() {
        let (x, y) = create_imbalanced_data();

        let a = SMOTE::new().with_seed(11).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(11).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_smote_rejects_tiny_minority() {
        let (x, y) = create_imbalanced_data();

        // 8 minority rows cannot support 8 neighbors
        let mut smote = SMOTE::new().with_k_neighbors(8);
        assert!(smote.fit_resample(&x, &y).is_err());
    }

    #[test]
    fn test_smote_rejects_single_class() {
        let x = Array2::zeros((10, 2));
        let y = Array1::from_elem(10, 1i64);
        assert!(SMOTE::new().fit_resample(&x, &y).is_err());
    }

    #[test]
    fn test_already_balanced_is_unchanged() {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array1::from_shape_fn(12, |i| (i % 2) as i64);

        let result = SMOTE::new().fit_resample(&x, &y).unwrap();
        assert_eq!(result.x, x);
        assert_eq!(result.total_synthetic(), 0);
    }
}
