//! Kernel PCA
//!
//! Projects rows onto the leading eigenvectors of the double-centered
//! kernel matrix of the training rows. The fitted model keeps the training
//! rows so new data can be projected through the same kernel.

use crate::error::{PipelineError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Eigenvalues below this fraction of the largest one are treated as zero
const EIGENVALUE_TOLERANCE: f64 = 1e-12;

/// Kernel function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    /// `<x, y>`
    Linear,
    /// `exp(-gamma * |x - y|^2)`
    Rbf,
    /// `(gamma * <x, y> + coef0)^degree`
    Polynomial { degree: i32, coef0: f64 },
    /// `tanh(gamma * <x, y> + coef0)`
    Sigmoid { coef0: f64 },
    /// `<x, y> / (|x| |y|)`
    Cosine,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Linear
    }
}

impl Kernel {
    fn compute(&self, a: ArrayView1<f64>, b: ArrayView1<f64>, gamma: f64) -> f64 {
        match *self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * sq).exp()
            }
            Kernel::Polynomial { degree, coef0 } => (gamma * a.dot(&b) + coef0).powi(degree),
            Kernel::Sigmoid { coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
            Kernel::Cosine => {
                let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
                if denom > 0.0 { a.dot(&b) / denom } else { 0.0 }
            }
        }
    }
}

/// Kernel PCA configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelPCAConfig {
    /// Number of output dimensions
    pub n_components: usize,
    /// Kernel function
    pub kernel: Kernel,
    /// Kernel coefficient; `None` means `1 / n_features`
    pub gamma: Option<f64>,
    /// 1 builds the kernel matrix on the calling thread, any other value uses the rayon pool
    pub n_jobs: usize,
}

impl Default for KernelPCAConfig {
    fn default() -> Self {
        Self {
            n_components: 90,
            kernel: Kernel::Linear,
            gamma: None,
            n_jobs: 1,
        }
    }
}

impl KernelPCAConfig {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            ..Default::default()
        }
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }
}

/// State learned by [`KernelPCA::fit`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedKernelPCA {
    /// Training rows, needed to evaluate the kernel against new data
    x_fit: Array2<f64>,
    /// Eigenvectors divided by sqrt(eigenvalue), one column per component
    projection: Array2<f64>,
    /// Eigenvalues of the centered kernel, descending
    eigenvalues: Array1<f64>,
    /// Sum of all positive eigenvalues
    total_variance: f64,
    /// Column means of the training kernel matrix
    kernel_col_means: Array1<f64>,
    /// Grand mean of the training kernel matrix
    kernel_mean: f64,
    /// Resolved kernel coefficient
    gamma: f64,
}

/// Kernel principal component analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelPCA {
    config: KernelPCAConfig,
    fitted: Option<FittedKernelPCA>,
}

impl KernelPCA {
    pub fn new(config: KernelPCAConfig) -> Self {
        Self { config, fitted: None }
    }

    pub fn config(&self) -> &KernelPCAConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn n_components(&self) -> usize {
        self.config.n_components
    }

    /// Number of input features seen during fit
    pub fn n_features_in(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.x_fit.ncols())
    }

    /// Eigenvalues of the centered training kernel for each component
    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.eigenvalues)
    }

    /// Share of the centered kernel's variance captured by each component
    pub fn explained_variance_ratio(&self) -> Option<Array1<f64>> {
        self.fitted.as_ref().map(|f| {
            if f.total_variance > 0.0 {
                &f.eigenvalues / f.total_variance
            } else {
                Array1::zeros(f.eigenvalues.len())
            }
        })
    }

    /// Fit the projection on training rows.
    ///
    /// Labels are accepted for signature compatibility with supervised
    /// reducers and are not used.
    pub fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<i64>>) -> Result<()> {
        let (n_samples, n_features) = x.dim();
        let n_components = self.config.n_components;

        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::DataError(
                "Kernel PCA requires a non-empty input".to_string(),
            ));
        }
        if n_components == 0 {
            return Err(PipelineError::invalid_parameter(
                "n_components",
                n_components,
                "must be positive",
            ));
        }
        if n_features < n_components {
            return Err(PipelineError::shape(
                format!("at least {} input features", n_components),
                format!("{} features", n_features),
            ));
        }
        if n_samples < n_components {
            return Err(PipelineError::shape(
                format!("at least {} samples", n_components),
                format!("{} samples", n_samples),
            ));
        }

        let gamma = match self.config.gamma {
            Some(g) if g > 0.0 => g,
            Some(g) => {
                return Err(PipelineError::invalid_parameter("gamma", g, "must be positive"))
            }
            None => 1.0 / n_features as f64,
        };

        // Kernel matrix and its centering statistics
        let k = self.kernel_matrix(x, x, gamma)?;
        let kernel_col_means = k.mean_axis(Axis(0)).ok_or_else(|| {
            PipelineError::ComputationError("empty kernel matrix".to_string())
        })?;
        let kernel_mean = kernel_col_means.mean().unwrap_or(0.0);
        let centered = center_kernel(&k, &kernel_col_means, &kernel_col_means, kernel_mean);

        let eigen = SymmetricEigen::new(DMatrix::from_fn(n_samples, n_samples, |i, j| {
            centered[[i, j]]
        }));

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[b]
                .partial_cmp(&eigen.eigenvalues[a])
                .unwrap_or(Ordering::Equal)
        });

        let largest = eigen.eigenvalues[order[0]].max(0.0);
        let cutoff = largest * EIGENVALUE_TOLERANCE;
        let total_variance: f64 = eigen.eigenvalues.iter().filter(|&&v| v > cutoff).sum();

        let mut eigenvalues = Array1::zeros(n_components);
        let mut projection = Array2::zeros((n_samples, n_components));
        for (c, &idx) in order.iter().take(n_components).enumerate() {
            let lambda = eigen.eigenvalues[idx];
            if lambda <= cutoff {
                // Rank-deficient direction: the component projects to zero
                continue;
            }
            eigenvalues[c] = lambda;

            let column = eigen.eigenvectors.column(idx);
            let sign = deterministic_sign(column.iter().copied());
            let scale = sign / lambda.sqrt();
            for i in 0..n_samples {
                projection[[i, c]] = column[i] * scale;
            }
        }

        debug!(
            n_samples,
            n_features,
            n_components,
            retained = eigenvalues.iter().filter(|&&v| v > 0.0).count(),
            "Kernel PCA fitted"
        );

        self.fitted = Some(FittedKernelPCA {
            x_fit: x.to_owned(),
            projection,
            eigenvalues,
            total_variance,
            kernel_col_means,
            kernel_mean,
            gamma,
        });
        Ok(())
    }

    /// Project rows onto the fitted components
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != fitted.x_fit.ncols() {
            return Err(PipelineError::shape(
                format!("{} features", fitted.x_fit.ncols()),
                format!("{} features", x.ncols()),
            ));
        }

        let k = self.kernel_matrix(x, &fitted.x_fit, fitted.gamma)?;
        let row_means = k.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(x.nrows()));
        let centered = center_kernel(&k, &row_means, &fitted.kernel_col_means, fitted.kernel_mean);

        Ok(centered.dot(&fitted.projection))
    }

    /// Fit on `x` and return its projection
    pub fn fit_transform(&mut self, x: &Array2<f64>, y: Option<&Array1<i64>>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    /// Kernel values between every row of `a` and every row of `b`
    fn kernel_matrix(&self, a: &Array2<f64>, b: &Array2<f64>, gamma: f64) -> Result<Array2<f64>> {
        let kernel = self.config.kernel;
        let n_cols = b.nrows();
        let kernel_row = |i: usize| {
            let row = a.row(i);
            (0..n_cols).map(move |j| kernel.compute(row, b.row(j), gamma))
        };

        let values: Vec<f64> = if self.config.n_jobs == 1 {
            (0..a.nrows()).flat_map(kernel_row).collect()
        } else {
            (0..a.nrows()).into_par_iter().flat_map_iter(kernel_row).collect()
        };
        Ok(Array2::from_shape_vec((a.nrows(), n_cols), values)?)
    }
}

/// `K[i,j] - row_means[i] - col_means[j] + mean`
fn center_kernel(
    k: &Array2<f64>,
    row_means: &Array1<f64>,
    col_means: &Array1<f64>,
    mean: f64,
) -> Array2<f64> {
    Array2::from_shape_fn(k.dim(), |(i, j)| k[[i, j]] - row_means[i] - col_means[j] + mean)
}

/// Sign that makes the largest-magnitude entry of an eigenvector positive
fn deterministic_sign(values: impl Iterator<Item = f64>) -> f64 {
    let pivot = values.fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 { -1.0 } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn test_output_has_requested_columns() {
        let x = random_matrix(120, 100, 1);
        let test = random_matrix(30, 100, 2);

        let mut kpca = KernelPCA::new(KernelPCAConfig::new(90));
        let train_out = kpca.fit_transform(&x, None).unwrap();
        let test_out = kpca.transform(&test).unwrap();

        assert_eq!(train_out.dim(), (120, 90));
        assert_eq!(test_out.dim(), (30, 90));
    }

    #[test]
    fn test_kernel_matrix_is_sequential_by_default() {
        assert_eq!(KernelPCAConfig::default().n_jobs, 1);

        let x = random_matrix(40, 12, 3);
        let config = KernelPCAConfig::new(5).with_kernel(Kernel::Rbf);
        let mut seq = KernelPCA::new(config.clone());
        let mut par = KernelPCA::new(config.with_n_jobs(0));

        let seq_out = seq.fit_transform(&x, None).unwrap();
        let par_out = par.fit_transform(&x, None).unwrap();
        assert_eq!(seq_out, par_out);
    }

    #[test]
    fn test_linear_kernel_matches_pca_variance() {
        // Points on a line: a single component carries all the variance
        let x = Array2::from_shape_fn((10, 3), |(i, j)| (i as f64) * (j as f64 + 1.0));
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(2));
        let out = kpca.fit_transform(&x, None).unwrap();

        let ratio = kpca.explained_variance_ratio().unwrap();
        assert!(ratio[0] > 0.999);
        assert_eq!(ratio[1], 0.0);

        // Second component is degenerate and projects to zero
        assert!(out.column(1).iter().all(|v| v.abs() < 1e-9));

        // Projected coordinates are centered
        assert!(out.column(0).sum().abs() < 1e-8);
    }

    #[test]
    fn test_training_projection_has_eigenvalue_norms() {
        let x = random_matrix(40, 12, 5);
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(4));
        let out = kpca.fit_transform(&x, None).unwrap();
        let eigenvalues = kpca.eigenvalues().unwrap().clone();

        for c in 0..4 {
            let norm_sq: f64 = out.column(c).iter().map(|v| v * v).sum();
            assert!((norm_sq - eigenvalues[c]).abs() < 1e-6 * eigenvalues[c].max(1.0));
        }
        for c in 1..4 {
            assert!(eigenvalues[c - 1] >= eigenvalues[c]);
        }
    }

    #[test]
    fn test_labels_do_not_change_the_projection() {
        let x = random_matrix(30, 10, 9);
        let y = Array1::from_shape_fn(30, |i| (i % 2) as i64);

        let mut with_labels = KernelPCA::new(KernelPCAConfig::new(5));
        let mut without = KernelPCA::new(KernelPCAConfig::new(5));
        let a = with_labels.fit_transform(&x, Some(&y)).unwrap();
        let b = without.fit_transform(&x, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rbf_kernel() {
        let x = random_matrix(25, 6, 3);
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(3).with_kernel(Kernel::Rbf).with_gamma(0.5));
        let out = kpca.fit_transform(&x, None).unwrap();
        assert_eq!(out.dim(), (25, 3));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rejects_too_few_features() {
        let x = random_matrix(100, 50, 4);
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(90));
        assert!(matches!(kpca.fit(&x, None), Err(PipelineError::ShapeError { .. })));
    }

    #[test]
    fn test_rejects_empty_and_unfitted() {
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(2));
        assert!(kpca.transform(&random_matrix(3, 3, 1)).is_err());
        assert!(kpca.fit(&Array2::zeros((0, 3)), None).is_err());
    }

    #[test]
    fn test_transform_rejects_feature_mismatch() {
        let mut kpca = KernelPCA::new(KernelPCAConfig::new(2));
        kpca.fit(&random_matrix(10, 4, 1), None).unwrap();
        assert!(kpca.transform(&random_matrix(3, 5, 2)).is_err());
    }
}
