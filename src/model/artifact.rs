//! Serialized model artifact format.
//!
//! An artifact is one JSON document:
//!
//! ```json
//! {
//!   "id": "credit-approval",
//!   "version": "1.2.0",
//!   "format": "dense_json",
//!   "schema": { "features": [ { "name": "age", "type": "numeric" } ] },
//!   "output": { "kind": "binary", "labels": ["declined", "approved"], "threshold": 0.5 },
//!   "network": { "input_dim": 1, "layers": [ ... ] }
//! }
//! ```
//!
//! ONNX graphs are embedded base64-encoded under `onnx_base64` with
//! `"format": "onnx"`.

use serde::{Deserialize, Serialize};

use super::schema::FeatureSchema;
use crate::error::PredictError;
use crate::ml::DenseNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    DenseJson,
    Onnx,
}

impl std::fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactFormat::DenseJson => write!(f, "dense_json"),
            ArtifactFormat::Onnx => write!(f, "onnx"),
        }
    }
}

/// What the raw model output means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputTask {
    /// Single probability; `labels` is `[negative, positive]`.
    Binary {
        labels: Vec<String>,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    /// One score per label.
    Multiclass { labels: Vec<String> },
    Regression {
        #[serde(default)]
        name: Option<String>,
    },
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(flatten)]
    pub task: OutputTask,
    /// Decimal places kept in the response
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    4
}

impl OutputSpec {
    /// Check labels and threshold against the model's output width
    pub fn validate(&self, output_dim: usize) -> std::result::Result<(), String> {
        if self.decimals > 12 {
            return Err(format!("decimals {} exceeds 12", self.decimals));
        }
        match &self.task {
            OutputTask::Binary { labels, threshold } => {
                if labels.len() != 2 {
                    return Err(format!("binary output needs 2 labels, got {}", labels.len()));
                }
                if !(0.0..=1.0).contains(threshold) {
                    return Err(format!("binary threshold {threshold} outside [0, 1]"));
                }
                if output_dim != 1 {
                    return Err(format!("binary output expects output_dim 1, got {output_dim}"));
                }
            }
            OutputTask::Multiclass { labels } => {
                if labels.len() < 2 {
                    return Err("multiclass output needs at least 2 labels".to_string());
                }
                if labels.len() != output_dim {
                    return Err(format!(
                        "multiclass labels ({}) != output_dim {output_dim}",
                        labels.len()
                    ));
                }
            }
            OutputTask::Regression { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: String,
    pub version: String,
    pub format: ArtifactFormat,
    pub schema: FeatureSchema,
    pub output: OutputSpec,
    /// Present for `dense_json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<DenseNetwork>,
    /// Present for `onnx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onnx_base64: Option<String>,
    /// Free-form training metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ModelArtifact {
    /// Decode artifact bytes. Undecodable bytes are a deployment problem, not
    /// a transient one, so everything here maps to `ArtifactCorrupt`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PredictError> {
        let artifact: Self = serde_json::from_slice(bytes)
            .map_err(|e| PredictError::ArtifactCorrupt(format!("artifact is not valid JSON: {e}")))?;
        if artifact.id.trim().is_empty() || artifact.version.trim().is_empty() {
            return Err(PredictError::ArtifactCorrupt(
                "artifact id and version must not be empty".to_string(),
            ));
        }
        artifact
            .schema
            .validate()
            .map_err(|e| PredictError::ArtifactCorrupt(format!("invalid schema: {e}")))?;
        Ok(artifact)
    }
}
