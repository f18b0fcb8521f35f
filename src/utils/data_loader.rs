//! CSV loading into ndarray structures

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Feature matrix and label vector loaded from disk
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<i64>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

/// Reads headed, comma-separated files
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used for schema inference; `None` scans the whole file
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
        }
    }

    /// Set how many rows polars scans to infer column types
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::DataError(format!("Cannot open {}: {}", path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        Ok(df)
    }

    /// Load a feature matrix; every column must be numeric and complete
    pub fn load_features(&self, path: impl AsRef<Path>) -> Result<(Array2<f64>, Vec<String>)> {
        let df = self.load_csv(path)?;
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        Ok((dataframe_to_array2(&df)?, names))
    }

    /// Load a single-column label file
    pub fn load_labels(&self, path: impl AsRef<Path>) -> Result<Array1<i64>> {
        let df = self.load_csv(path)?;
        if df.width() != 1 {
            return Err(PipelineError::DataError(format!(
                "Label file must have exactly one column, found {}",
                df.width()
            )));
        }

        let column = &df.get_columns()[0];
        let values = column_to_f64(column)?;
        values
            .into_iter()
            .map(|v| {
                if v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(PipelineError::DataError(format!(
                        "Label column '{}' contains non-integer value {}",
                        column.name(),
                        v
                    )))
                }
            })
            .collect::<Result<Vec<i64>>>()
            .map(Array1::from_vec)
    }

    /// Load features and labels, checking that they line up row for row
    pub fn load_dataset(
        &self,
        features_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> Result<Dataset> {
        let start = Instant::now();
        let (x, feature_names) = self.load_features(features_path.as_ref())?;
        let y = self.load_labels(labels_path.as_ref())?;

        if x.nrows() != y.len() {
            return Err(PipelineError::shape(
                format!("{} label rows", x.nrows()),
                format!("{} label rows", y.len()),
            ));
        }

        info!(
            rows = x.nrows(),
            features = x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(Dataset { x, y, feature_names })
    }
}

fn column_to_f64(column: &Column) -> Result<Vec<f64>> {
    let series = column.as_materialized_series();
    let nulls_before = series.null_count();
    let cast = series.cast(&DataType::Float64)?;

    if nulls_before > 0 || cast.null_count() > nulls_before {
        return Err(PipelineError::DataError(format!(
            "Column '{}' has missing or non-numeric values",
            series.name()
        )));
    }

    Ok(cast.f64()?.into_no_null_iter().collect())
}

/// Convert every column of a frame into a row-major `f64` matrix
pub fn dataframe_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = df
        .get_columns()
        .iter()
        .map(column_to_f64)
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((df.height(), col_data.len()), |(r, c)| col_data[c][r]))
}

/// Write predicted labels to a single-column CSV
pub fn save_predictions(path: impl AsRef<Path>, predictions: &Array1<i64>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut df = df!("prediction" => predictions.to_vec())?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_load_dataset() {
        let features = csv_file(&["a,b,c", "1,2,3", "4,5.5,6", "7,8,9"]);
        let labels = csv_file(&["label", "0", "1", "0"]);

        let ds = DataLoader::new()
            .load_dataset(features.path(), labels.path())
            .unwrap();

        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_features(), 3);
        assert_eq!(ds.feature_names, vec!["a", "b", "c"]);
        assert_eq!(ds.x[[1, 1]], 5.5);
        assert_eq!(ds.y.to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_float_labels_are_accepted_when_integral() {
        let labels = csv_file(&["label", "1.0", "0.0"]);
        let y = DataLoader::new().load_labels(labels.path()).unwrap();
        assert_eq!(y.to_vec(), vec![1, 0]);
    }

    #[test]
    fn test_row_mismatch_is_shape_error() {
        let features = csv_file(&["a,b", "1,2", "3,4", "5,6"]);
        let labels = csv_file(&["label", "0", "1"]);

        let err = DataLoader::new()
            .load_dataset(features.path(), labels.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ShapeError { .. }));
    }

    #[test]
    fn test_non_numeric_column_rejected() {
        let features = csv_file(&["a,b", "1,x", "3,y"]);
        let err = DataLoader::new().load_features(features.path()).unwrap_err();
        assert!(matches!(err, PipelineError::DataError(_)));
    }

    #[test]
    fn test_late_decimal_value_in_integer_column() {
        let mut lines = vec!["a,b".to_string()];
        lines.extend((0..150).map(|i| format!("{},{}", i, i % 7)));
        lines.push("1.5,2".to_string());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let features = csv_file(&refs);

        let (x, _) = DataLoader::new().load_features(features.path()).unwrap();
        assert_eq!(x.dim(), (151, 2));
        assert_eq!(x[[150, 0]], 1.5);
        assert_eq!(x[[149, 0]], 149.0);

        // A short inference window types the column as integer and then fails
        let short = DataLoader::new().with_infer_schema_length(Some(100));
        assert!(short.load_features(features.path()).is_err());
    }

    #[test]
    fn test_missing_value_rejected() {
        let features = csv_file(&["a,b", "1,", "3,4"]);
        assert!(DataLoader::new().load_features(features.path()).is_err());
    }

    #[test]
    fn test_labels_need_one_column() {
        let labels = csv_file(&["a,b", "0,1"]);
        assert!(DataLoader::new().load_labels(labels.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = DataLoader::new()
            .load_csv(dir.path().join("nope.csv"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataError(_)));
    }

    #[test]
    fn test_save_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("pred.csv");
        save_predictions(&path, &Array1::from_vec(vec![1i64, 0, 1])).unwrap();

        let y = DataLoader::new().load_labels(&path).unwrap();
        assert_eq!(y.to_vec(), vec![1, 0, 1]);
    }
}
