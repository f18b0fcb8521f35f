//! Model export and serialization
//!
//! Binary envelopes for the fitted scaler, reducer and classifier.

mod serializer;

pub use serializer::{
    commit_staged, load_model, load_model_with_metadata, save_model, stage_model, ModelMetadata,
    ModelSerializer, SerializedModel, StagedModel,
};
