//! Fitted model persistence
//!
//! Every artifact is a bincode-encoded [`SerializedModel`] envelope: magic
//! bytes, a format version, descriptive metadata, the bincode payload of the
//! model itself and an FNV-1a checksum of that payload.

use crate::decomposition::KernelPCA;
use crate::error::{PipelineError, Result};
use crate::preprocessing::MinMaxScaler;
use crate::training::KNNClassifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Descriptive metadata stored alongside a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model type tag, checked on load
    pub model_type: String,
    /// Crate version that wrote the file
    pub crate_version: String,
    pub created_at: DateTime<Utc>,
    /// Input feature count, when the model is fitted
    pub n_features_in: Option<usize>,
    /// JSON rendering of the model configuration
    pub hyperparameters: String,
}

impl ModelMetadata {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            n_features_in: None,
            hyperparameters: String::new(),
        }
    }

    pub fn with_features(mut self, n_features: Option<usize>) -> Self {
        self.n_features_in = n_features;
        self
    }

    pub fn with_hyperparameters<T: Serialize>(mut self, params: &T) -> Result<Self> {
        self.hyperparameters = serde_json::to_string(params)?;
        Ok(self)
    }
}

/// On-disk model envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    pub magic: [u8; 4],
    pub format_version: u32,
    pub metadata: ModelMetadata,
    pub model_data: Vec<u8>,
    pub checksum: u64,
}

impl SerializedModel {
    pub const MAGIC: [u8; 4] = *b"KNNP";
    pub const VERSION: u32 = 1;

    pub fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = fnv1a(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    pub fn verify_checksum(&self) -> bool {
        fnv1a(&self.model_data) == self.checksum
    }

    /// Check magic, version and checksum
    fn validate(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(PipelineError::SerializationError(
                "Not a model file (bad magic bytes)".to_string(),
            ));
        }
        if self.format_version != Self::VERSION {
            return Err(PipelineError::SerializationError(format!(
                "Unsupported format version {} (expected {})",
                self.format_version,
                Self::VERSION
            )));
        }
        if !self.verify_checksum() {
            return Err(PipelineError::SerializationError(
                "Checksum mismatch, model file is corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

/// FNV-1a 64-bit hash
fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    data.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Models that can be written to and read from an envelope
pub trait ModelSerializer: Serialize + for<'de> Deserialize<'de> + Sized {
    /// Tag written into the metadata and checked on load
    const MODEL_TYPE: &'static str;

    fn metadata(&self) -> Result<ModelMetadata>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl ModelSerializer for MinMaxScaler {
    const MODEL_TYPE: &'static str = "min_max_scaler";

    fn metadata(&self) -> Result<ModelMetadata> {
        ModelMetadata::new(Self::MODEL_TYPE)
            .with_features(self.data_min().map(|m| m.len()))
            .with_hyperparameters(self.config())
    }
}

impl ModelSerializer for KernelPCA {
    const MODEL_TYPE: &'static str = "kernel_pca";

    fn metadata(&self) -> Result<ModelMetadata> {
        ModelMetadata::new(Self::MODEL_TYPE)
            .with_features(self.n_features_in())
            .with_hyperparameters(self.config())
    }
}

impl ModelSerializer for KNNClassifier {
    const MODEL_TYPE: &'static str = "knn_classifier";

    fn metadata(&self) -> Result<ModelMetadata> {
        ModelMetadata::new(Self::MODEL_TYPE)
            .with_features(self.n_features_in())
            .with_hyperparameters(self.config())
    }
}

/// A model envelope written beside its destination but not yet moved there
#[derive(Debug)]
pub struct StagedModel {
    tmp_path: PathBuf,
    path: PathBuf,
}

impl StagedModel {
    /// Rename the staged file over the destination
    pub fn commit(self) -> Result<PathBuf> {
        fs::rename(&self.tmp_path, &self.path)?;
        Ok(self.path)
    }

    /// Remove the staged file, leaving the destination untouched
    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            warn!(path = %self.tmp_path.display(), error = %e, "Failed to remove staged model");
        }
    }
}

/// Write a model envelope to a temporary sibling of `path`.
///
/// Nothing at `path` changes until [`StagedModel::commit`].
pub fn stage_model<M: ModelSerializer>(model: &M, path: impl AsRef<Path>) -> Result<StagedModel> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let envelope = SerializedModel::new(model.metadata()?, model.to_bytes()?);
    let tmp_path = path.with_extension("tmp");
    let file = File::create(&tmp_path).map_err(|e| {
        PipelineError::DataError(format!("Failed to create {}: {}", tmp_path.display(), e))
    })?;
    let staged = StagedModel {
        tmp_path,
        path: path.to_path_buf(),
    };

    let mut writer = BufWriter::new(file);
    let written = bincode::serialize_into(&mut writer, &envelope)
        .map_err(PipelineError::from)
        .and_then(|_| writer.flush().map_err(PipelineError::from));
    drop(writer);
    if let Err(e) = written {
        staged.discard();
        return Err(e);
    }

    debug!(
        path = %path.display(),
        model_type = M::MODEL_TYPE,
        bytes = envelope.model_data.len(),
        "Staged model"
    );
    Ok(staged)
}

/// Commit staged models in order; the rest are discarded if a rename fails
pub fn commit_staged(staged: Vec<StagedModel>) -> Result<Vec<PathBuf>> {
    let mut committed = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();
    while let Some(model) = pending.next() {
        match model.commit() {
            Ok(path) => committed.push(path),
            Err(e) => {
                pending.for_each(StagedModel::discard);
                return Err(e);
            }
        }
    }
    Ok(committed)
}

/// Write a model envelope to `path`, replacing any existing file.
///
/// The bytes go to a sibling temporary file first and are renamed into
/// place, so a failed write never leaves a truncated artifact behind.
pub fn save_model<M: ModelSerializer>(model: &M, path: impl AsRef<Path>) -> Result<()> {
    stage_model(model, path)?.commit()?;
    Ok(())
}

/// Read and verify the envelope at `path`, then decode the model
pub fn load_model<M: ModelSerializer>(path: impl AsRef<Path>) -> Result<M> {
    let (model, _) = load_model_with_metadata(path)?;
    Ok(model)
}

/// Like [`load_model`], also returning the stored metadata
pub fn load_model_with_metadata<M: ModelSerializer>(
    path: impl AsRef<Path>,
) -> Result<(M, ModelMetadata)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        PipelineError::DataError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let envelope: SerializedModel = bincode::deserialize_from(BufReader::new(file))?;
    envelope.validate()?;

    if envelope.metadata.model_type != M::MODEL_TYPE {
        return Err(PipelineError::SerializationError(format!(
            "{} holds a '{}' model, expected '{}'",
            path.display(),
            envelope.metadata.model_type,
            M::MODEL_TYPE
        )));
    }

    let model = M::from_bytes(&envelope.model_data)?;
    Ok((model, envelope.metadata))
}
