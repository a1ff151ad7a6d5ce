//! Response Formatter: raw model output -> Prediction Response.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PredictError;
use crate::model::{ModelDescriptor, OutputSpec, OutputTask};

/// Body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub model: ModelDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Per-label scores for multiclass models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<String, f64>>,
    /// Raw (rounded) model outputs
    pub outputs: Vec<f64>,
}

/// Shape `output` according to `spec`.
///
/// Deterministic. An output that does not fit the spec is reported as
/// `InferenceError`.
pub fn format(
    output: &[f64],
    spec: &OutputSpec,
    model: &ModelDescriptor,
) -> Result<PredictionResponse, PredictError> {
    if output.is_empty() {
        return Err(PredictError::InferenceError("model produced no output".to_string()));
    }
    if let Some(pos) = output.iter().position(|v| !v.is_finite()) {
        return Err(PredictError::InferenceError(format!(
            "model output[{pos}] is not finite"
        )));
    }

    let round = |v: f64| round_to(v, spec.decimals);
    let outputs: Vec<f64> = output.iter().copied().map(round).collect();

    let mut response = PredictionResponse {
        model: model.clone(),
        label: None,
        score: None,
        scores: None,
        outputs,
    };

    match &spec.task {
        OutputTask::Binary { labels, threshold } => {
            let [p] = output else {
                return Err(width_error("binary", 1, output.len()));
            };
            if !(0.0..=1.0).contains(p) {
                return Err(PredictError::InferenceError(format!(
                    "binary output {p} is not a probability"
                )));
            }
            let index = usize::from(*p >= *threshold);
            let label = labels.get(index).ok_or_else(|| {
                PredictError::InferenceError(format!("binary output has no label at {index}"))
            })?;
            response.label = Some(label.clone());
            response.score = Some(round(*p));
        }
        OutputTask::Multiclass { labels } => {
            if output.len() != labels.len() {
                return Err(width_error("multiclass", labels.len(), output.len()));
            }
            let (best, best_score) = output
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
            response.label = labels.get(best).cloned();
            response.score = Some(round(best_score));
            response.scores = Some(
                labels
                    .iter()
                    .cloned()
                    .zip(output.iter().copied().map(round))
                    .collect(),
            );
        }
        OutputTask::Regression { .. } => {
            if let [v] = output {
                response.score = Some(round(*v));
            }
        }
    }

    Ok(response)
}

fn width_error(kind: &str, expected: usize, got: usize) -> PredictError {
    PredictError::InferenceError(format!(
        "{kind} output expects {expected} value(s), model produced {got}"
    ))
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
