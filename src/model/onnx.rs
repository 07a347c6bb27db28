//! ONNX Runtime inference for the neural collaborators. Input: [n, features] f32.
//! A missing or unreadable model file is fatal; there is no fallback mode.

use super::{Classifier, ReconstructionModel, RepresentationEncoder};
use crate::error::{ScoringError, ScoringResult};
use ndarray::{Array2, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::path::Path;
use std::sync::{Arc, OnceLock};

static ORT_ENV: OnceLock<Arc<Environment>> = OnceLock::new();

fn environment() -> ScoringResult<Arc<Environment>> {
    if let Some(env) = ORT_ENV.get() {
        return Ok(env.clone());
    }
    let env = Environment::builder()
        .with_name("fraudscore")
        .build()
        .map_err(|e| ScoringError::model("onnx-runtime", e))?
        .into_arc();
    Ok(ORT_ENV.get_or_init(|| env).clone())
}

pub struct OnnxModel {
    name: String,
    session: Session,
    output_index: usize,
}

impl OnnxModel {
    /// Load a model whose first output is the prediction.
    pub fn load(path: &Path, name: &str) -> ScoringResult<Self> {
        let session = Self::session(path, name)?;
        tracing::debug!(
            model = name,
            input = session.inputs.first().map(|i| i.name.as_str()).unwrap_or(""),
            "onnx model loaded"
        );
        Ok(Self {
            name: name.to_string(),
            session,
            output_index: 0,
        })
    }

    /// Load a classifier; the output named like `prob*` (else the last one) holds probabilities.
    pub fn load_probability_model(path: &Path, name: &str) -> ScoringResult<Self> {
        let session = Self::session(path, name)?;
        let output_index = session
            .outputs
            .iter()
            .position(|o| o.name.contains("prob"))
            .unwrap_or_else(|| session.outputs.len().saturating_sub(1));
        tracing::debug!(model = name, output_index, "onnx classifier loaded");
        Ok(Self {
            name: name.to_string(),
            session,
            output_index,
        })
    }

    fn session(path: &Path, name: &str) -> ScoringResult<Session> {
        if !path.exists() {
            return Err(ScoringError::model(
                name,
                format!("model file not found: {}", path.display()),
            ));
        }
        let env = environment()?;
        SessionBuilder::new(&env)
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.with_model_from_file(path))
            .map_err(|e| ScoringError::model(name, e))
    }

    /// Run the model on a batch; the selected output is reshaped to [n, k].
    fn run(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        let rows = input.nrows();
        let array = CowArray::from(input.mapv(|v| v as f32).into_dyn());
        let value = Value::from_array(self.session.allocator(), &array)
            .map_err(|e| ScoringError::model(&self.name, e))?;
        let outputs = self
            .session
            .run(vec![value])
            .map_err(|e| ScoringError::model(&self.name, e))?;
        let output = outputs
            .get(self.output_index)
            .ok_or_else(|| ScoringError::model(&self.name, "missing output tensor"))?;
        let tensor = output
            .try_extract::<f32>()
            .map_err(|e| ScoringError::model(&self.name, e))?;
        let view = tensor.view();
        let values: Vec<f64> = view.iter().map(|&v| v as f64).collect();
        if rows == 0 || values.len() % rows != 0 {
            return Err(ScoringError::ShapeMismatch {
                model: self.name.clone(),
                expected: format!("a multiple of {} values", rows),
                actual: format!("{} values", values.len()),
            });
        }
        let cols = values.len() / rows;
        Array2::from_shape_vec((rows, cols), values).map_err(|e| ScoringError::model(&self.name, e))
    }
}

impl RepresentationEncoder for OnnxModel {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        self.run(input)
    }
}

impl ReconstructionModel for OnnxModel {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        let out = self.run(input)?;
        if out.dim() != input.dim() {
            return Err(ScoringError::ShapeMismatch {
                model: self.name.clone(),
                expected: format!("{:?}", input.dim()),
                actual: format!("{:?}", out.dim()),
            });
        }
        Ok(out)
    }
}

impl Classifier for OnnxModel {
    /// `[n, 2]` outputs are class probabilities; column 1 is fraud.
    fn predict_probability(&self, input: &Array2<f64>) -> ScoringResult<Vec<f64>> {
        let out = self.run(input)?;
        let col = if out.ncols() >= 2 { 1 } else { 0 };
        Ok(out.column(col).to_vec())
    }
}
