//! JSON-exported parameters of the fitted scaler, one-hot encoders and k-means model.

use super::{CategoricalEncoder, Clusterer, Scaler};
use crate::error::{ScoringError, ScoringResult};
use ndarray::{Array2, ArrayView1, Axis};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> ScoringResult<T> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| ScoringError::model(path.display().to_string(), e))?;
    serde_json::from_str(&data).map_err(|e| ScoringError::model(path.display().to_string(), e))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerParams {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl ScalerParams {
    fn len(&self) -> (usize, usize) {
        match self {
            ScalerParams::Standard { mean, scale } => (mean.len(), scale.len()),
            ScalerParams::MinMax { min, scale } => (min.len(), scale.len()),
        }
    }

    fn apply(&self, col: usize, x: f64) -> f64 {
        match self {
            ScalerParams::Standard { mean, scale } => {
                let s = if scale[col] == 0.0 { 1.0 } else { scale[col] };
                (x - mean[col]) / s
            }
            ScalerParams::MinMax { min, scale } => x * scale[col] + min[col],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnScaler {
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub params: ScalerParams,
}

impl ColumnScaler {
    pub fn new(columns: Vec<String>, params: ScalerParams) -> ScoringResult<Self> {
        let scaler = Self { columns, params };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn from_file(path: &Path) -> ScoringResult<Self> {
        let scaler: Self = read_json(path)?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> ScoringResult<()> {
        let n = self.columns.len();
        let (a, b) = self.params.len();
        if a != n || b != n {
            return Err(ScoringError::ShapeMismatch {
                model: "scaler".into(),
                expected: format!("{} parameters per vector", n),
                actual: format!("{} and {}", a, b),
            });
        }
        Ok(())
    }
}

impl Scaler for ColumnScaler {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn transform(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        if input.ncols() != self.columns.len() {
            return Err(ScoringError::ShapeMismatch {
                model: "scaler".into(),
                expected: format!("{} columns", self.columns.len()),
                actual: format!("{} columns", input.ncols()),
            });
        }
        let mut out = input.clone();
        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|x| self.params.apply(col, x));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn new(column: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            column: column.into(),
            categories,
        }
    }

    pub fn from_file(path: &Path) -> ScoringResult<Self> {
        read_json(path)
    }
}

impl CategoricalEncoder for OneHotEncoder {
    fn column(&self) -> &str {
        &self.column
    }

    fn categories(&self) -> &[String] {
        &self.categories
    }

    fn transform(&self, values: &[Option<&str>]) -> ScoringResult<Array2<f64>> {
        let mut out = Array2::zeros((values.len(), self.categories.len()));
        for (row, value) in values.iter().enumerate() {
            let Some(value) = value else { continue };
            let col = self
                .categories
                .iter()
                .position(|c| c == value)
                .ok_or_else(|| ScoringError::UnknownCategory {
                    column: self.column.clone(),
                    value: value.to_string(),
                })?;
            out[[row, col]] = 1.0;
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct KMeansFile {
    centroids: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct KMeansClusterer {
    centroids: Array2<f64>,
}

impl KMeansClusterer {
    pub fn new(centroids: Array2<f64>) -> Self {
        Self { centroids }
    }

    pub fn from_file(path: &Path) -> ScoringResult<Self> {
        let file: KMeansFile = read_json(path)?;
        let rows = file.centroids.len();
        let dim = file.centroids.first().map(Vec::len).unwrap_or(0);
        if rows == 0 || file.centroids.iter().any(|c| c.len() != dim) {
            return Err(ScoringError::ShapeMismatch {
                model: "clusterer".into(),
                expected: "non-empty rectangular centroid matrix".into(),
                actual: format!("{} centroids", rows),
            });
        }
        let flat: Vec<f64> = file.centroids.into_iter().flatten().collect();
        let centroids = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| ScoringError::model("clusterer", e))?;
        Ok(Self { centroids })
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl Clusterer for KMeansClusterer {
    fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Nearest centroid; ties go to the lowest cluster id.
    fn predict(&self, embedding: &Array2<f64>) -> ScoringResult<Vec<usize>> {
        if embedding.ncols() != self.centroids.ncols() {
            return Err(ScoringError::ShapeMismatch {
                model: "clusterer".into(),
                expected: format!("{} latent dimensions", self.centroids.ncols()),
                actual: format!("{}", embedding.ncols()),
            });
        }
        Ok(embedding
            .outer_iter()
            .map(|point| {
                let mut best = (0, f64::INFINITY);
                for (id, centroid) in self.centroids.outer_iter().enumerate() {
                    let d = squared_distance(point, centroid);
                    if d < best.1 {
                        best = (id, d);
                    }
                }
                best.0
            })
            .collect())
    }
}
