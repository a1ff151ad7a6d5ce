use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactFormat, ModelArtifact, OutputSpec};
use super::schema::FeatureSchema;
use crate::error::PredictError;
use crate::ml::DenseNetwork;
#[cfg(feature = "onnx")]
use crate::ml::OnnxModel;

/// Identity of the model that answered a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub version: String,
}

#[derive(Debug)]
enum ModelBackend {
    Dense(DenseNetwork),
    #[cfg(feature = "onnx")]
    Onnx(OnnxModel),
}

/// Deserialized, ready-to-invoke model. Immutable after construction, so it
/// is shared between concurrent invocations without locking.
#[derive(Debug)]
pub struct LoadedModel {
    descriptor: ModelDescriptor,
    format: ArtifactFormat,
    schema: FeatureSchema,
    output: OutputSpec,
    backend: ModelBackend,
    loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, PredictError> {
        let corrupt = PredictError::ArtifactCorrupt;

        let backend = match artifact.format {
            ArtifactFormat::DenseJson => {
                let network = artifact
                    .network
                    .ok_or_else(|| corrupt("dense_json artifact has no network".to_string()))?;
                network
                    .validate()
                    .map_err(|e| corrupt(format!("invalid network: {e}")))?;
                ModelBackend::Dense(network)
            }
            ArtifactFormat::Onnx => {
                let encoded = artifact
                    .onnx_base64
                    .as_deref()
                    .ok_or_else(|| corrupt("onnx artifact has no onnx_base64 payload".to_string()))?;
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| corrupt(format!("onnx payload is not base64: {e}")))?;
                onnx_backend(&bytes, artifact.schema.encoded_width())?
            }
        };

        let model = Self {
            descriptor: ModelDescriptor {
                id: artifact.id,
                version: artifact.version,
            },
            format: artifact.format,
            schema: artifact.schema,
            output: artifact.output,
            backend,
            loaded_at: Utc::now(),
        };

        if model.input_dim() != model.schema.encoded_width() {
            return Err(corrupt(format!(
                "schema encodes {} input columns but the model expects {}",
                model.schema.encoded_width(),
                model.input_dim()
            )));
        }
        model
            .output
            .validate(model.output_dim())
            .map_err(|e| corrupt(format!("invalid output spec: {e}")))?;

        Ok(model)
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn output_spec(&self) -> &OutputSpec {
        &self.output
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn input_dim(&self) -> usize {
        match &self.backend {
            ModelBackend::Dense(net) => net.input_dim,
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(model) => model.input_dim(),
        }
    }

    pub fn output_dim(&self) -> usize {
        match &self.backend {
            ModelBackend::Dense(net) => net.output_dim(),
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(model) => model.output_dim(),
        }
    }

    /// Run the model on an encoded input vector
    pub fn infer(&self, input: &[f64]) -> Result<Vec<f64>, PredictError> {
        match &self.backend {
            ModelBackend::Dense(net) => net.forward(input),
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(model) => model.predict(input),
        }
    }
}

#[cfg(feature = "onnx")]
fn onnx_backend(bytes: &[u8], input_dim: usize) -> Result<ModelBackend, PredictError> {
    Ok(ModelBackend::Onnx(OnnxModel::from_bytes(bytes, input_dim)?))
}

#[cfg(not(feature = "onnx"))]
fn onnx_backend(_bytes: &[u8], _input_dim: usize) -> Result<ModelBackend, PredictError> {
    Err(PredictError::ArtifactCorrupt(
        "onnx artifacts require a build with the `onnx` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(network: serde_json::Value, output: serde_json::Value) -> ModelArtifact {
        serde_json::from_value(json!({
            "id": "m",
            "version": "1",
            "format": "dense_json",
            "schema": {"features": [
                {"name": "x", "type": "numeric"},
                {"name": "color", "type": "categorical", "categories": ["red", "blue"]}
            ]},
            "output": output,
            "network": network
        }))
        .unwrap()
    }

    #[test]
    fn builds_when_widths_agree() {
        let model = LoadedModel::from_artifact(artifact(
            json!({"input_dim": 3, "layers": [{"weights": [[1.0, 0.5, -0.5]], "bias": [0.0], "activation": "sigmoid"}]}),
            json!({"kind": "binary", "labels": ["no", "yes"]}),
        ))
        .unwrap();

        assert_eq!(model.input_dim(), 3);
        assert_eq!(model.output_dim(), 1);
        assert_eq!(model.descriptor().id, "m");
        let out = model.infer(&[0.0, 1.0, 0.0]).unwrap();
        assert!(out[0] > 0.5);
    }

    #[test]
    fn schema_width_mismatch_is_corrupt() {
        let err = LoadedModel::from_artifact(artifact(
            json!({"input_dim": 2, "layers": [{"weights": [[1.0, 1.0]], "bias": [0.0]}]}),
            json!({"kind": "regression"}),
        ))
        .unwrap_err();
        assert!(matches!(err, PredictError::ArtifactCorrupt(_)));
    }

    #[test]
    fn output_spec_mismatch_is_corrupt() {
        let err = LoadedModel::from_artifact(artifact(
            json!({"input_dim": 3, "layers": [{"weights": [[1.0, 1.0, 1.0], [0.0, 0.0, 0.0]], "bias": [0.0, 0.0]}]}),
            json!({"kind": "binary", "labels": ["no", "yes"]}),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("output_dim"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn onnx_without_feature_is_corrupt() {
        let mut a = artifact(
            json!({"input_dim": 3, "layers": [{"weights": [[1.0, 1.0, 1.0]], "bias": [0.0]}]}),
            json!({"kind": "regression"}),
        );
        a.format = ArtifactFormat::Onnx;
        a.onnx_base64 = Some(BASE64.encode(b"graph"));
        let err = LoadedModel::from_artifact(a).unwrap_err();
        assert!(err.is_fatal());
    }
}
