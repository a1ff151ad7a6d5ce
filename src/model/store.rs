//! Model store access: resolve an artifact reference and fetch its bytes.
//!
//! Backends only move bytes. [`StoreAccessor`] layers the retry policy for
//! transient failures and the optional SHA-256 integrity check on top.

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::config::{AppConfig, StoreToken};
use crate::error::PredictError;

/// Where an artifact lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactReference {
    /// Bundled with the deployed package
    Local(PathBuf),
    /// Fetched from a blob store over HTTP(S)
    Remote(Url),
}

impl ArtifactReference {
    /// Parse a configured reference.
    ///
    /// `blob://<key>` is resolved against `endpoint`; anything without a
    /// scheme is a filesystem path.
    pub fn parse(raw: &str, endpoint: Option<&str>) -> Result<Self, PredictError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PredictError::ArtifactNotFound(
                "empty artifact reference".to_string(),
            ));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(Self::Local(PathBuf::from(raw)));
        };

        match scheme {
            "file" => Ok(Self::Local(PathBuf::from(rest))),
            "http" | "https" => Url::parse(raw)
                .map(Self::Remote)
                .map_err(|e| PredictError::ArtifactNotFound(format!("invalid URL {raw}: {e}"))),
            "blob" => {
                let endpoint = endpoint.ok_or_else(|| {
                    PredictError::ArtifactNotFound(format!(
                        "{raw} needs store.endpoint to be configured"
                    ))
                })?;
                let base = if endpoint.ends_with('/') {
                    endpoint.to_string()
                } else {
                    format!("{endpoint}/")
                };
                Url::parse(&base)
                    .and_then(|b| b.join(rest.trim_start_matches('/')))
                    .map(Self::Remote)
                    .map_err(|e| {
                        PredictError::ArtifactNotFound(format!(
                            "cannot resolve {raw} against {endpoint}: {e}"
                        ))
                    })
            }
            other => Err(PredictError::ArtifactNotFound(format!(
                "unsupported artifact scheme '{other}' in {raw}"
            ))),
        }
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactReference::Local(path) => write!(f, "{}", path.display()),
            ArtifactReference::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// A source of artifact bytes. Implementations must be idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        timeout: Duration,
    ) -> Result<Vec<u8>, PredictError>;
}

/// Reads artifacts packaged next to the binary
#[derive(Debug, Default, Clone)]
pub struct LocalStore;

#[async_trait]
impl ModelStore for LocalStore {
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        timeout: Duration,
    ) -> Result<Vec<u8>, PredictError> {
        let ArtifactReference::Local(path) = reference else {
            return Err(PredictError::ArtifactNotFound(format!(
                "{reference} is not a local artifact"
            )));
        };

        match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
            Err(_) => Err(PredictError::FetchTimeout {
                reference: reference.to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Err(
                    PredictError::ArtifactNotFound(format!("{}: {e}", path.display())),
                ),
                _ => Err(PredictError::ArtifactUnavailable(format!(
                    "{}: {e}",
                    path.display()
                ))),
            },
        }
    }
}

/// Fetches artifacts from an HTTP(S) blob store
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    auth_token: Option<StoreToken>,
}

impl HttpStore {
    pub fn new(auth_token: Option<StoreToken>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lambda-api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, auth_token })
    }
}

#[async_trait]
impl ModelStore for HttpStore {
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        timeout: Duration,
    ) -> Result<Vec<u8>, PredictError> {
        let ArtifactReference::Remote(url) = reference else {
            return Err(PredictError::ArtifactNotFound(format!(
                "{reference} is not a remote artifact"
            )));
        };

        let mut request = self.client.get(url.clone()).timeout(timeout);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose());
        }

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                PredictError::FetchTimeout {
                    reference: url.to_string(),
                    elapsed_ms: timeout.as_millis() as u64,
                }
            } else {
                PredictError::ArtifactUnavailable(format!("{url}: {e}"))
            }
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url, timeout));
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Map a non-success response; only statuses that cannot change on retry
/// are reported as `ArtifactNotFound`.
fn classify_status(status: StatusCode, url: &Url, timeout: Duration) -> PredictError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PredictError::FetchTimeout {
            reference: url.to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        },
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            PredictError::ArtifactUnavailable(format!("{url} returned {status}"))
        }
        _ => PredictError::ArtifactNotFound(format!("{url} returned {status}")),
    }
}

/// Dispatches to the local or remote backend by reference kind
pub struct RoutingStore {
    local: Arc<dyn ModelStore>,
    remote: Arc<dyn ModelStore>,
}

impl RoutingStore {
    pub fn new(local: Arc<dyn ModelStore>, remote: Arc<dyn ModelStore>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl ModelStore for RoutingStore {
    async fn fetch(
        &self,
        reference: &ArtifactReference,
        timeout: Duration,
    ) -> Result<Vec<u8>, PredictError> {
        match reference {
            ArtifactReference::Local(_) => self.local.fetch(reference, timeout).await,
            ArtifactReference::Remote(_) => self.remote.fetch(reference, timeout).await,
        }
    }
}

/// Model Store Accessor: fetch with bounded retries and integrity checking
pub struct StoreAccessor {
    store: Arc<dyn ModelStore>,
    expected_sha256: Option<String>,
    retries: u8,
    backoff: Duration,
}

impl StoreAccessor {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            expected_sha256: None,
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Local + HTTP backends configured from `store.*` and `model.*`
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let remote = HttpStore::new(config.store.auth_token.clone())?;
        let store = RoutingStore::new(Arc::new(LocalStore), Arc::new(remote));
        Ok(Self::new(Arc::new(store))
            .with_sha256(config.model.sha256.clone())
            .with_retries(config.model.fetch_retries, config.model.retry_backoff()))
    }

    pub fn with_sha256(mut self, expected: Option<String>) -> Self {
        self.expected_sha256 = expected.map(|s| s.to_ascii_lowercase());
        self
    }

    pub fn with_retries(mut self, retries: u8, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Fetch artifact bytes. Each attempt is bounded by `timeout`; only
    /// retryable failures are attempted again.
    pub async fn fetch(
        &self,
        reference: &ArtifactReference,
        timeout: Duration,
    ) -> Result<Vec<u8>, PredictError> {
        let mut attempt: u8 = 0;
        loop {
            let started = Instant::now();
            match self.store.fetch(reference, timeout).await {
                Ok(bytes) => {
                    debug!(
                        %reference,
                        bytes = bytes.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "artifact fetched"
                    );
                    self.verify(reference, &bytes)?;
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff_for(attempt);
                    warn!(
                        %reference,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient artifact fetch failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_for(&self, attempt: u8) -> Duration {
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let base = self.backoff.as_millis() as u64 * u64::from(attempt);
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    fn verify(&self, reference: &ArtifactReference, bytes: &[u8]) -> Result<(), PredictError> {
        let Some(expected) = &self.expected_sha256 else {
            return Ok(());
        };
        let actual = hex::encode(Sha256::digest(bytes));
        if &actual != expected {
            return Err(PredictError::ArtifactCorrupt(format!(
                "{reference}: sha256 {actual} does not match expected {expected}"
            )));
        }
        Ok(())
    }
}
