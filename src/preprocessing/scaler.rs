//! Min-max feature scaling

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Scaler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Target range `(lo, hi)` for each feature
    pub feature_range: (f64, f64),
    /// Clamp transformed values into `feature_range`
    pub clip: bool,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            feature_range: (-1.0, 1.0),
            clip: true,
        }
    }
}

/// Parameters for a fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    data_min: Array1<f64>,
    data_max: Array1<f64>,
    /// Per-feature multiplier
    scale: Array1<f64>,
    /// Per-feature offset applied after scaling
    offset: Array1<f64>,
}

/// Per-column min-max scaler.
///
/// Maps each training column's `[min, max]` onto `feature_range`. A constant
/// column is treated as having unit range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    config: ScalerConfig,
    params: Option<ScalerParams>,
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new(ScalerConfig::default())
    }
}

impl MinMaxScaler {
    /// Create a new scaler
    pub fn new(config: ScalerConfig) -> Self {
        Self { config, params: None }
    }

    /// Set the output range
    pub fn with_range(mut self, lo: f64, hi: f64) -> Self {
        self.config.feature_range = (lo, hi);
        self
    }

    /// Enable or disable clipping
    pub fn with_clip(mut self, clip: bool) -> Self {
        self.config.clip = clip;
        self
    }

    pub fn config(&self) -> &ScalerConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn data_min(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.data_min)
    }

    pub fn data_max(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.data_max)
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let (lo, hi) = self.config.feature_range;
        if !(lo < hi) {
            return Err(PipelineError::invalid_parameter(
                "feature_range",
                format!("({}, {})", lo, hi),
                "minimum must be smaller than maximum",
            ));
        }
        if x.nrows() == 0 {
            return Err(PipelineError::DataError(
                "Cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let data_min = x.fold_axis(Axis(0), f64::INFINITY, |&acc, &v| acc.min(v));
        let data_max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v));

        let scale = Zip::from(&data_min).and(&data_max).map_collect(|&min, &max| {
            let range = max - min;
            (hi - lo) / if range == 0.0 { 1.0 } else { range }
        });
        let offset = Zip::from(&data_min).and(&scale).map_collect(|&min, &s| lo - min * s);

        self.params = Some(ScalerParams {
            data_min,
            data_max,
            scale,
            offset,
        });
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(x)?;
        let (lo, hi) = self.config.feature_range;
        let clip = self.config.clip;

        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&params.scale)
                .and(&params.offset)
                .for_each(|v, &s, &o| {
                    let scaled = *v * s + o;
                    *v = if clip { scaled.clamp(lo, hi) } else { scaled };
                });
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map scaled values back to the original feature space
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(x)?;

        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&params.scale)
                .and(&params.offset)
                .for_each(|v, &s, &o| *v = (*v - o) / s);
        }
        Ok(out)
    }

    fn checked_params(&self, x: &Array2<f64>) -> Result<&ScalerParams> {
        let params = self.params.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != params.scale.len() {
            return Err(PipelineError::shape(
                format!("{} features", params.scale.len()),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(params)
    }
}
