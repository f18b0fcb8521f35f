//! Cross-validation splitters

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

impl CVStrategy {
    /// Number of folds this strategy produces
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => {
                *n_splits
            }
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Set or clear the random state
    pub fn with_optional_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate train/test splits.
    ///
    /// `y` is only consulted by the stratified strategy.
    pub fn split(&self, n_samples: usize, y: Option<&Array1<i64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    PipelineError::ValidationError(
                        "StratifiedKFold requires target array".to_string(),
                    )
                })?;
                if y.len() != n_samples {
                    return Err(PipelineError::shape(
                        format!("{} labels", n_samples),
                        format!("{} labels", y.len()),
                    ));
                }
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn check_n_splits(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(PipelineError::invalid_parameter(
                "n_splits",
                n_splits,
                "must be at least 2",
            ));
        }
        if n_samples < n_splits {
            return Err(PipelineError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_n_splits(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });

            current += fold_size;
        }

        Ok(splits)
    }

    fn stratified_k_fold_split(
        &self,
        y: &Array1<i64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        Self::check_n_splits(y.len(), n_splits)?;

        // Ordered map keeps fold assignment stable for a given seed
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in y.iter().enumerate() {
            class_indices.entry(label).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Continue the round-robin across classes so fold sizes stay within one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next % n_splits].push(idx);
                next += 1;
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let test_indices = folds[fold_idx].clone();
                let train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold, in fold order
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: 0.0,
                std_score: 0.0,
                n_folds,
            };
        }

        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance =
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(splits: &[CVSplit], n: usize) {
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..n).collect::<Vec<_>>());

        for split in splits {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), n);
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
        }
    }

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }
        assert_partition(&splits, 100);
    }

    #[test]
    fn test_k_fold_uneven_sizes() {
        let cv = CrossValidator::new(CVStrategy::default()).with_random_state(7);
        let splits = cv.split(23, None).unwrap();

        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
        assert_partition(&splits, 23);
    }

    #[test]
    fn test_k_fold_shuffle_is_seeded() {
        let a = CrossValidator::new(CVStrategy::default()).with_random_state(42);
        let b = CrossValidator::new(CVStrategy::default()).with_random_state(42);

        let sa = a.split(50, None).unwrap();
        let sb = b.split(50, None).unwrap();
        for (x, y) in sa.iter().zip(sb.iter()) {
            assert_eq!(x.test_indices, y.test_indices);
        }

        // Shuffled order differs from the identity layout
        let identity: Vec<usize> = (0..10).collect();
        assert_ne!(sa[0].test_indices, identity);
    }

    #[test]
    fn test_unseeded_still_partitions() {
        let cv = CrossValidator::new(CVStrategy::default());
        let splits = cv.split(37, None).unwrap();
        assert_partition(&splits, 37);
    }

    #[test]
    fn test_k_fold_rejects_bad_sizes() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 1, shuffle: true });
        assert!(cv.split(10, None).is_err());

        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: true });
        assert!(cv.split(3, None).is_err());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
            .with_random_state(3);
        let splits = cv.split(20, Some(&y)).unwrap();

        assert_eq!(splits.len(), 4);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 5);
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(positives, 3);
        }
        assert_partition(&splits, 20);
    }

    #[test]
    fn test_stratified_requires_labels() {
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: false });
        assert!(cv.split(10, None).is_err());
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.5, 0.7, 0.6, 0.8, 0.4]);
        assert_eq!(results.n_folds, 5);
        assert!((results.mean_score - 0.6).abs() < 1e-12);
        assert!((results.std_score - 0.02f64.sqrt()).abs() < 1e-12);
    }
}
