use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the process (startup, runtimes, CLI)
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Prediction pipeline errors
    #[error(transparent)]
    Predict(#[from] PredictError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lambda runtime error: {0}")]
    Lambda(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure taxonomy of the prediction pipeline.
///
/// Every variant is cheap to clone so that a fatal cold-load failure can be
/// memoized by the model cache and handed out again on later invocations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    // Client-caused
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Schema mismatch: {}", describe_schema_mismatch(.missing, .unexpected))]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Type mismatch on {}: {detail}", .fields.join(", "))]
    TypeMismatch { fields: Vec<String>, detail: String },

    // Server-caused, fatal until redeploy
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Model artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    // Server-caused, transient
    #[error("Model artifact fetch timed out after {elapsed_ms}ms: {reference}")]
    FetchTimeout { reference: String, elapsed_ms: u64 },

    #[error("Model store unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Inference error: {0}")]
    InferenceError(String),
}

fn describe_schema_mismatch(missing: &[String], unexpected: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required feature(s): {}", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected feature(s): {}", unexpected.join(", ")));
    }
    parts.join("; ")
}

/// Stable, wire-level name of a [`PredictError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedRequest,
    SchemaMismatch,
    TypeMismatch,
    ArtifactNotFound,
    ArtifactCorrupt,
    FetchTimeout,
    ArtifactUnavailable,
    InferenceError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::MalformedRequest,
        ErrorKind::SchemaMismatch,
        ErrorKind::TypeMismatch,
        ErrorKind::ArtifactNotFound,
        ErrorKind::ArtifactCorrupt,
        ErrorKind::FetchTimeout,
        ErrorKind::ArtifactUnavailable,
        ErrorKind::InferenceError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::SchemaMismatch => "schema_mismatch",
            Self::TypeMismatch => "type_mismatch",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::ArtifactCorrupt => "artifact_corrupt",
            Self::FetchTimeout => "fetch_timeout",
            Self::ArtifactUnavailable => "artifact_unavailable",
            Self::InferenceError => "inference_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            Self::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            Self::FetchTimeout { .. } => ErrorKind::FetchTimeout,
            Self::ArtifactUnavailable(_) => ErrorKind::ArtifactUnavailable,
            Self::InferenceError(_) => ErrorKind::InferenceError,
        }
    }

    /// Caused by the request itself; never worth retrying unchanged.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_) | Self::SchemaMismatch { .. } | Self::TypeMismatch { .. }
        )
    }

    /// Deterministic failure of the deployed artifact. Retrying will not help
    /// without a redeploy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ArtifactNotFound(_) | Self::ArtifactCorrupt(_))
    }

    /// Safe for the caller to retry (the fetch is idempotent).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchTimeout { .. } | Self::ArtifactUnavailable(_))
    }

    /// HTTP-equivalent status code of the invocation result
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) | Self::SchemaMismatch { .. } | Self::TypeMismatch { .. } => {
                400
            }
            Self::ArtifactNotFound(_) | Self::ArtifactCorrupt(_) | Self::InferenceError(_) => 500,
            Self::ArtifactUnavailable(_) => 503,
            Self::FetchTimeout { .. } => 504,
        }
    }

    /// Offending feature names, if any
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::SchemaMismatch {
                missing,
                unexpected,
            } => missing.iter().chain(unexpected.iter()).cloned().collect(),
            Self::TypeMismatch { fields, .. } => fields.clone(),
            _ => Vec::new(),
        }
    }
}
