//! Request validation against a model's feature schema
//!
//! Turns an untrusted JSON payload into a [`PredictionRequest`]: every value
//! checked against the schema's declared type and encoded into the model's
//! input vector. Side-effect free.
//!
//! Accepted payload shapes:
//! - a mapping of feature name to value: `{"age": 34, "income": 52000}`
//! - positional values in schema order: `[34, 52000]`, `{"data": [34, 52000]}`
//!   or a bare scalar for single-feature models
//!
//! Type problems on supplied features are reported before missing/unexpected
//! keys, so a request with a wrongly typed value is told about that value first.
use serde_json::{Map, Value};

use crate::error::PredictError;
use crate::model::{FeatureSchema, FeatureSpec, FeatureType};

/// Key of the legacy positional envelope `{"data": [...]}`
pub const POSITIONAL_DATA_KEY: &str = "data";

/// A validated feature value
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Numeric(f64),
    Category(String),
    Text(String),
}

/// Validated request, ready for inference
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    features: Vec<(String, FeatureValue)>,
    input: Vec<f64>,
}

impl PredictionRequest {
    /// Feature values in schema order
    pub fn features(&self) -> &[(String, FeatureValue)] {
        &self.features
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Encoded model input vector
    pub fn input(&self) -> &[f64] {
        &self.input
    }

    pub fn into_input(self) -> Vec<f64> {
        self.input
    }
}

/// Validate a raw payload against `schema`
pub fn validate(raw: &Value, schema: &FeatureSchema) -> Result<PredictionRequest, PredictError> {
    let mapping = normalize_payload(raw, schema)?;

    let mut type_errors: Vec<(String, String)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    let mut features = Vec::with_capacity(schema.features.len());

    for spec in &schema.features {
        let supplied = mapping.get(&spec.name).filter(|v| !v.is_null());
        let value = match (supplied, &spec.default) {
            (Some(v), _) => v,
            (None, Some(default)) => default,
            (None, None) => {
                missing.push(spec.name.clone());
                continue;
            }
        };
        match check_value(spec, value) {
            Ok(v) => features.push((spec.name.clone(), v)),
            Err(detail) => type_errors.push((spec.name.clone(), detail)),
        }
    }

    if !type_errors.is_empty() {
        let detail = type_errors
            .iter()
            .map(|(name, detail)| format!("{name}: {detail}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PredictError::TypeMismatch {
            fields: type_errors.into_iter().map(|(name, _)| name).collect(),
            detail,
        });
    }

    let unexpected: Vec<String> = if schema.allow_extra {
        Vec::new()
    } else {
        mapping
            .keys()
            .filter(|k| !schema.contains(k))
            .cloned()
            .collect()
    };

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(PredictError::SchemaMismatch {
            missing,
            unexpected,
        });
    }

    let input = encode(schema, &features);
    Ok(PredictionRequest { features, input })
}

/// Bring every accepted payload shape into a name -> value mapping
fn normalize_payload(raw: &Value, schema: &FeatureSchema) -> Result<Map<String, Value>, PredictError> {
    match raw {
        Value::Object(map) => {
            let is_positional_envelope = map.len() == 1
                && map.contains_key(POSITIONAL_DATA_KEY)
                && !schema.contains(POSITIONAL_DATA_KEY);
            if !is_positional_envelope {
                return Ok(map.clone());
            }
            match &map[POSITIONAL_DATA_KEY] {
                Value::Object(inner) => Ok(inner.clone()),
                Value::Array(values) => positional(values, schema),
                scalar @ (Value::Number(_) | Value::String(_)) => {
                    positional(std::slice::from_ref(scalar), schema)
                }
                other => Err(PredictError::MalformedRequest(format!(
                    "'{POSITIONAL_DATA_KEY}' must be an object, array or scalar, got {}",
                    json_type(other)
                ))),
            }
        }
        Value::Array(values) => positional(values, schema),
        Value::Number(_) | Value::String(_) => positional(std::slice::from_ref(raw), schema),
        other => Err(PredictError::MalformedRequest(format!(
            "payload must be an object, array or scalar, got {}",
            json_type(other)
        ))),
    }
}

/// Map positional values onto schema features in declaration order
fn positional(values: &[Value], schema: &FeatureSchema) -> Result<Map<String, Value>, PredictError> {
    if values.len() > schema.features.len() {
        return Err(PredictError::SchemaMismatch {
            missing: Vec::new(),
            unexpected: (schema.features.len()..values.len())
                .map(|i| format!("[{i}]"))
                .collect(),
        });
    }
    Ok(schema
        .features
        .iter()
        .zip(values)
        .map(|(spec, v)| (spec.name.clone(), v.clone()))
        .collect())
}

fn check_value(spec: &FeatureSpec, value: &Value) -> Result<FeatureValue, String> {
    match &spec.kind {
        FeatureType::Numeric => match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(FeatureValue::Numeric)
                .ok_or_else(|| format!("number {n} is not representable")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FeatureValue::Numeric)
                .ok_or_else(|| format!("expected numeric, got non-numeric string {s:?}")),
            other => Err(format!("expected numeric, got {}", json_type(other))),
        },
        FeatureType::Categorical { categories } => match value {
            Value::String(s) if categories.iter().any(|c| c == s) => {
                Ok(FeatureValue::Category(s.clone()))
            }
            Value::String(s) => Err(format!(
                "{s:?} is not one of [{}]",
                categories.join(", ")
            )),
            other => Err(format!("expected categorical string, got {}", json_type(other))),
        },
        FeatureType::String => match value {
            Value::String(s) => Ok(FeatureValue::Text(s.clone())),
            other => Err(format!("expected string, got {}", json_type(other))),
        },
    }
}

fn encode(schema: &FeatureSchema, features: &[(String, FeatureValue)]) -> Vec<f64> {
    let mut input = Vec::with_capacity(schema.encoded_width());
    for (spec, (_, value)) in schema.features.iter().zip(features) {
        match (&spec.kind, value) {
            (FeatureType::Numeric, FeatureValue::Numeric(v)) => input.push(*v),
            (FeatureType::Categorical { categories }, FeatureValue::Category(c)) => {
                input.extend(categories.iter().map(|k| if k == c { 1.0 } else { 0.0 }));
            }
            _ => {}
        }
    }
    input
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
