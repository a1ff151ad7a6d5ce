//! Dense neural network inference.
//!
//! Covers the small tabular models this endpoint serves:
//! - logistic / binary classifiers (single sigmoid output)
//! - multiclass classifiers (softmax output layer)
//! - linear regressors
//!
//! Shapes are validated once at load time; `forward` only re-checks the input
//! width and the finiteness of the result.

use serde::{Deserialize, Serialize};

use crate::error::PredictError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    /// Applied across the whole layer output, not element-wise.
    Softmax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    /// Shape and value checks for a layer fed by `fan_in` inputs
    fn check(&self, fan_in: usize, is_output: bool) -> std::result::Result<(), String> {
        if self.weights.is_empty() {
            return Err("no units".to_string());
        }
        if self.bias.len() != self.out_dim() {
            return Err(format!("{} biases for {} units", self.bias.len(), self.out_dim()));
        }
        if let Some((unit, row)) = self.weights.iter().enumerate().find(|(_, r)| r.len() != fan_in) {
            return Err(format!("unit {unit} has {} weights, expected {fan_in}", row.len()));
        }
        let all_finite = self
            .weights
            .iter()
            .flatten()
            .chain(&self.bias)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("non-finite weight or bias".to_string());
        }
        if self.activation == Activation::Softmax && !is_output {
            return Err("softmax is only allowed on the output layer".to_string());
        }
        Ok(())
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>())
            .collect();
        match self.activation {
            Activation::Softmax => softmax_in_place(&mut y),
            act => y.iter_mut().for_each(|v| *v = activate(*v, act)),
        }
        y
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    /// Expected input dimension.
    pub input_dim: usize,

    /// Optional z-score normalization applied before the first layer.
    #[serde(default)]
    pub input_mean: Option<Vec<f64>>,
    #[serde(default)]
    pub input_std: Option<Vec<f64>>,

    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }
        match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => {
                if mean.len() != self.input_dim || std.len() != self.input_dim {
                    return Err(format!(
                        "input_mean/input_std length ({}/{}) != input_dim {}",
                        mean.len(),
                        std.len(),
                        self.input_dim
                    ));
                }
                if std.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                    return Err("input_std must be finite and > 0".to_string());
                }
                if mean.iter().any(|v| !v.is_finite()) {
                    return Err("input_mean must be finite".to_string());
                }
            }
            (None, None) => {}
            _ => return Err("input_mean and input_std must be provided together".to_string()),
        }

        let last = self.layers.len() - 1;
        let mut fan_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            layer
                .check(fan_in, idx == last)
                .map_err(|e| format!("layer[{idx}]: {e}"))?;
            fan_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>, PredictError> {
        if input.len() != self.input_dim {
            return Err(PredictError::InferenceError(format!(
                "input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let normalized: Vec<f64> = match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => input
                .iter()
                .zip(mean.iter().zip(std))
                .map(|(v, (m, s))| (v - m) / s.max(1e-12))
                .collect(),
            _ => input.to_vec(),
        };

        let x = self
            .layers
            .iter()
            .fold(normalized, |acc, layer| layer.apply(&acc));

        if let Some(pos) = x.iter().position(|v| !v.is_finite()) {
            return Err(PredictError::InferenceError(format!(
                "model produced a non-finite value at output[{pos}]"
            )));
        }

        Ok(x)
    }
}

fn activate(x: f64, act: Activation) -> f64 {
    match act {
        Activation::Linear | Activation::Softmax => x,
        Activation::Relu => x.max(0.0),
        Activation::Tanh => x.tanh(),
        Activation::Sigmoid => sigmoid(x),
    }
}

/// Logistic function; branches keep `exp` from overflowing.
fn sigmoid(x: f64) -> f64 {
    if x < 0.0 {
        let e = x.exp();
        e / (1.0 + e)
    } else {
        (1.0 + (-x).exp()).recip()
    }
}

fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_layer(weights: Vec<Vec<f64>>, bias: Vec<f64>, activation: Activation) -> DenseNetwork {
        DenseNetwork {
            input_dim: weights[0].len(),
            input_mean: None,
            input_std: None,
            layers: vec![DenseLayer {
                weights,
                bias,
                activation,
            }],
        }
    }

    #[test]
    fn forward_sigmoid() {
        let net = single_layer(vec![vec![1.0, 2.0]], vec![0.0], Activation::Sigmoid);
        net.validate().unwrap();

        let p0 = net.forward(&[0.0, 0.0]).unwrap();
        assert!((p0[0] - 0.5).abs() < 1e-12);

        let p1 = net.forward(&[1.0, 0.0]).unwrap();
        assert!(p1[0] > 0.5);
    }

    #[test]
    fn softmax_sums_to_one() {
        let net = single_layer(
            vec![vec![1.0], vec![2.0], vec![-1.0]],
            vec![0.0, 0.0, 0.0],
            Activation::Softmax,
        );
        net.validate().unwrap();

        let out = net.forward(&[1.0]).unwrap();
        assert_eq!(out.len(), 3);
        assert!((out.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(out[1] > out[0] && out[0] > out[2]);
    }

    #[test]
    fn normalization_is_applied() {
        let mut net = single_layer(vec![vec![1.0]], vec![0.0], Activation::Linear);
        net.input_mean = Some(vec![10.0]);
        net.input_std = Some(vec![2.0]);
        net.validate().unwrap();

        assert_eq!(net.forward(&[14.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn rejects_bad_shapes() {
        let mut bad = single_layer(vec![vec![1.0, 2.0]], vec![0.0], Activation::Linear);
        bad.input_dim = 3;
        assert!(bad.validate().is_err());

        let mut hidden_softmax = single_layer(vec![vec![1.0]], vec![0.0], Activation::Softmax);
        hidden_softmax.layers.push(DenseLayer {
            weights: vec![vec![1.0]],
            bias: vec![0.0],
            activation: Activation::Linear,
        });
        assert!(hidden_softmax.validate().is_err());
    }

    #[test]
    fn overflow_surfaces_as_inference_error() {
        let net = single_layer(vec![vec![1e308]], vec![0.0], Activation::Linear);
        net.validate().unwrap();

        let err = net.forward(&[1e308]).unwrap_err();
        assert!(matches!(err, PredictError::InferenceError(_)));
    }

    #[test]
    fn wrong_width_is_rejected() {
        let net = single_layer(vec![vec![1.0, 1.0]], vec![0.0], Activation::Linear);
        assert!(net.forward(&[1.0]).is_err());
    }
}
