//! ONNX inference wrapper (pure Rust via `tract-onnx`).
//!
//! The graph is specialized to a fixed `[1, input_dim]` f32 input at load time.

use crate::error::PredictError;

use tract_onnx::prelude::*;

#[derive(Clone)]
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
    input_dim: usize,
    output_dim: usize,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("input_dim", &self.input_dim)
            .field("output_dim", &self.output_dim)
            .finish()
    }
}

impl OnnxModel {
    /// Build a runnable plan from raw ONNX bytes.
    ///
    /// Any failure here means the artifact cannot be used as shipped, so it is
    /// reported as `ArtifactCorrupt`.
    pub fn from_bytes(bytes: &[u8], input_dim: usize) -> Result<Self, PredictError> {
        if input_dim == 0 {
            return Err(PredictError::ArtifactCorrupt(
                "onnx input_dim must be > 0".to_string(),
            ));
        }
        let corrupt = |stage: &str, e: TractError| {
            PredictError::ArtifactCorrupt(format!("onnx {stage} failed: {e}"))
        };

        let mut reader = std::io::Cursor::new(bytes);
        let model = tract_onnx::onnx()
            .model_for_read(&mut reader)
            .map_err(|e| corrupt("load", e))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, input_dim)))
            .map_err(|e| corrupt("input fact", e))?;

        let plan = model
            .into_optimized()
            .map_err(|e| corrupt("optimize", e))?
            .into_runnable()
            .map_err(|e| corrupt("runnable", e))?;

        let mut model = Self {
            plan,
            input_dim,
            output_dim: 0,
        };
        // Output width is only known after a trial run on zeros.
        model.output_dim = model
            .run(vec![0.0; input_dim])
            .map_err(|e| PredictError::ArtifactCorrupt(format!("onnx trial run failed: {e}")))?
            .len();
        if model.output_dim == 0 {
            return Err(PredictError::ArtifactCorrupt(
                "onnx output has zero elements".to_string(),
            ));
        }
        Ok(model)
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Run inference on a single feature vector.
    pub fn predict(&self, input: &[f64]) -> Result<Vec<f64>, PredictError> {
        if input.len() != self.input_dim {
            return Err(PredictError::InferenceError(format!(
                "onnx input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let values = input.iter().map(|v| *v as f32).collect();
        self.run(values)
            .map_err(|e| PredictError::InferenceError(format!("onnx run failed: {e}")))
    }

    fn run(&self, values: Vec<f32>) -> TractResult<Vec<f64>> {
        let tensor = tract_ndarray::Array2::from_shape_vec((1, self.input_dim), values)?.into_tvalue();
        let outputs = self.plan.run(tvec!(tensor))?;
        let first = outputs
            .first()
            .ok_or_else(|| format_err!("graph produced no outputs"))?;
        Ok(first
            .to_array_view::<f32>()?
            .iter()
            .map(|v| f64::from(*v))
            .collect())
    }
}
