//! Ordered feature schema declared by a model artifact.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureType {
    /// One input column; JSON numbers or numeric strings.
    Numeric,
    /// One-hot encoded, one column per category.
    Categorical { categories: Vec<String> },
    /// Accepted and carried on the request, never fed to the model.
    String,
}

impl FeatureType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical { .. } => "categorical",
            Self::String => "string",
        }
    }

    /// Number of model input columns this feature occupies
    pub fn encoded_width(&self) -> usize {
        match self {
            Self::Numeric => 1,
            Self::Categorical { categories } => categories.len(),
            Self::String => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureType,
    /// Value used when the request omits the feature; makes it optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FeatureSpec {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub features: Vec<FeatureSpec>,
    /// Accept (and ignore) keys the schema does not declare
    #[serde(default)]
    pub allow_extra: bool,
}

impl FeatureSchema {
    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Width of the encoded model input vector
    pub fn encoded_width(&self) -> usize {
        self.features.iter().map(|f| f.kind.encoded_width()).sum()
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.features.is_empty() {
            return Err("schema must declare at least one feature".to_string());
        }
        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.name.is_empty() {
                return Err("feature names must not be empty".to_string());
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(format!("duplicate feature name '{}'", feature.name));
            }
            if let FeatureType::Categorical { categories } = &feature.kind {
                if categories.is_empty() {
                    return Err(format!("categorical feature '{}' has no categories", feature.name));
                }
                let unique: HashSet<_> = categories.iter().collect();
                if unique.len() != categories.len() {
                    return Err(format!(
                        "categorical feature '{}' has duplicate categories",
                        feature.name
                    ));
                }
            }
            if let Some(default) = &feature.default {
                let ok = match &feature.kind {
                    FeatureType::Numeric => default.as_f64().is_some_and(f64::is_finite),
                    FeatureType::Categorical { categories } => default
                        .as_str()
                        .is_some_and(|s| categories.iter().any(|c| c == s)),
                    FeatureType::String => default.is_string(),
                };
                if !ok {
                    return Err(format!(
                        "default of feature '{}' is not a valid {} value",
                        feature.name,
                        feature.kind.name()
                    ));
                }
            }
        }
        if self.encoded_width() == 0 {
            return Err("schema encodes to an empty model input".to_string());
        }
        Ok(())
    }
}
