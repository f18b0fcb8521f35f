//! Data preprocessing
//!
//! Feature scaling fitted on a training fold and applied unchanged to the
//! matching test fold.

mod scaler;

pub use scaler::{MinMaxScaler, ScalerConfig};
