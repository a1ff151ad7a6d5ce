use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Artifact reference: path, file://, http(s):// or blob://<key>.
    /// `{version}` is replaced with `version`.
    pub reference: String,
    /// Requested artifact version; the loaded artifact must declare the same one
    #[serde(default)]
    pub version: Option<String>,
    /// Expected SHA-256 (hex) of the artifact bytes
    #[serde(default)]
    pub sha256: Option<String>,
    /// Upper bound for a single fetch attempt in milliseconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
    /// Additional attempts for transient fetch failures
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u8,
    /// Base backoff between fetch attempts in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_fetch_timeout() -> u64 {
    5000
}

fn default_fetch_retries() -> u8 {
    1
}

fn default_retry_backoff() -> u64 {
    200
}

impl ModelConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reference with the `{version}` placeholder substituted
    pub fn resolved_reference(&self) -> String {
        match &self.version {
            Some(v) => self.reference.replace("{version}", v),
            None => self.reference.clone(),
        }
    }
}

/// Remote blob store settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Base URL that `blob://<key>` references are resolved against
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token sent with remote fetches
    #[serde(default)]
    pub auth_token: Option<StoreToken>,
}

/// Secret wrapper; wiped from memory on drop and never printed.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct StoreToken(String);

impl StoreToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for StoreToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreToken(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port of the local HTTP server (`serve` subcommand)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs (CloudWatch friendly)
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("model.reference", "model/model.json")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("server.port", 8080)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (LAMBDA_API__MODEL__REFERENCE, etc.)
            .add_source(
                Environment::with_prefix("LAMBDA_API")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration pointing at a single artifact, used by tests and the CLI
    pub fn for_reference(reference: &str) -> Self {
        Self {
            model: ModelConfig {
                reference: reference.to_string(),
                version: None,
                sha256: None,
                fetch_timeout_ms: default_fetch_timeout(),
                fetch_retries: default_fetch_retries(),
                retry_backoff_ms: default_retry_backoff(),
            },
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model.reference.trim().is_empty() {
            errors.push("model.reference must not be empty".to_string());
        }

        if self.model.reference.contains("{version}") && self.model.version.is_none() {
            errors.push("model.reference uses {version} but model.version is not set".to_string());
        }

        if self.model.fetch_timeout_ms == 0 {
            errors.push("model.fetch_timeout_ms must be positive".to_string());
        }

        if let Some(sha) = &self.model.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push("model.sha256 must be 64 hex characters".to_string());
            }
        }

        if self.model.reference.starts_with("blob://") && self.store.endpoint.is_none() {
            errors.push("store.endpoint is required for blob:// references".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
