//! Dimensionality reduction

pub mod kernel_pca;

pub use kernel_pca::{Kernel, KernelPCA, KernelPCAConfig};
