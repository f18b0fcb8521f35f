//! Classification metrics

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label treated as the positive class by the binary metrics
pub const DEFAULT_POS_LABEL: i64 = 1;

/// Binary classification metrics for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ClassificationMetrics {
    /// Compute binary metrics with `pos_label` as the positive class.
    ///
    /// Undefined ratios (zero denominators) are reported as 0.0.
    pub fn compute_binary(
        y_true: &Array1<i64>,
        y_pred: &Array1<i64>,
        pos_label: i64,
    ) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::shape(
                format!("{} predictions", y_true.len()),
                format!("{} predictions", y_pred.len()),
            ));
        }
        if y_true.is_empty() {
            return Err(PipelineError::ValidationError(
                "Cannot score an empty test fold".to_string(),
            ));
        }

        let labels: BTreeSet<i64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        if labels.len() > 2 {
            return Err(PipelineError::ValidationError(format!(
                "Binary metrics need at most 2 distinct labels, found {:?}",
                labels
            )));
        }
        if labels.len() == 2 && !labels.contains(&pos_label) {
            return Err(PipelineError::invalid_parameter(
                "pos_label",
                pos_label,
                format!("not one of the observed labels {:?}", labels),
            ));
        }

        let mut metrics = Self {
            n_samples: y_true.len(),
            ..Default::default()
        };
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == pos_label, p == pos_label) {
                (true, true) => metrics.true_positives += 1,
                (false, true) => metrics.false_positives += 1,
                (true, false) => metrics.false_negatives += 1,
                (false, false) => metrics.true_negatives += 1,
            }
        }

        let tp = metrics.true_positives as f64;
        let correct = metrics.true_positives + metrics.true_negatives;
        metrics.accuracy = correct as f64 / metrics.n_samples as f64;
        metrics.precision = ratio(tp, tp + metrics.false_positives as f64);
        metrics.recall = ratio(tp, tp + metrics.false_negatives as f64);
        metrics.f1_score = if metrics.precision + metrics.recall > 0.0 {
            2.0 * metrics.precision * metrics.recall / (metrics.precision + metrics.recall)
        } else {
            0.0
        };

        Ok(metrics)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Binary F1 score against the default positive label
pub fn f1_score(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<f64> {
    ClassificationMetrics::compute_binary(y_true, y_pred, DEFAULT_POS_LABEL).map(|m| m.f1_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let y = array![0, 1, 1, 0, 1];
        let m = ClassificationMetrics::compute_binary(&y, &y, 1).unwrap();
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_f1_known_values() {
        // tp = 2, fp = 1, fn = 1 -> precision = recall = 2/3
        let y_true = array![1, 1, 1, 0, 0, 0];
        let y_pred = array![1, 1, 0, 1, 0, 0];
        let m = ClassificationMetrics::compute_binary(&y_true, &y_pred, 1).unwrap();

        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.true_negatives, 2);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_is_zero() {
        let y_true = array![1, 0, 0];
        let y_pred = array![0, 0, 0];
        assert_eq!(f1_score(&y_true, &y_pred).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_multiclass() {
        let y_true = array![0, 1, 2];
        let y_pred = array![0, 1, 1];
        assert!(f1_score(&y_true, &y_pred).is_err());
    }

    #[test]
    fn test_rejects_length_mismatch() {
        assert!(f1_score(&array![0, 1], &array![0]).is_err());
    }
}
