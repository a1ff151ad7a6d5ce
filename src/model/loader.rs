use std::time::{Duration, Instant};
use tracing::info;

use super::artifact::ModelArtifact;
use super::handle::LoadedModel;
use super::store::{ArtifactReference, StoreAccessor};
use crate::config::AppConfig;
use crate::error::{AppError, PredictError};

/// Fetches, decodes and checks the configured artifact.
pub struct ModelLoader {
    accessor: StoreAccessor,
    reference: ArtifactReference,
    requested_version: Option<String>,
    timeout: Duration,
}

impl ModelLoader {
    pub fn new(accessor: StoreAccessor, reference: ArtifactReference, timeout: Duration) -> Self {
        Self {
            accessor,
            reference,
            requested_version: None,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let reference = ArtifactReference::parse(
            &config.model.resolved_reference(),
            config.store.endpoint.as_deref(),
        )?;
        let accessor = StoreAccessor::from_config(config)?;
        Ok(Self::new(accessor, reference, config.model.fetch_timeout())
            .with_version(config.model.version.clone()))
    }

    /// Require the artifact to declare this version
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.requested_version = version;
        self
    }

    pub fn reference(&self) -> &ArtifactReference {
        &self.reference
    }

    pub async fn load(&self) -> Result<LoadedModel, PredictError> {
        let started = Instant::now();
        let bytes = self.accessor.fetch(&self.reference, self.timeout).await?;
        let artifact = ModelArtifact::from_bytes(&bytes)?;

        if let Some(expected) = &self.requested_version {
            if &artifact.version != expected {
                return Err(PredictError::ArtifactCorrupt(format!(
                    "{} declares version {} but {} was requested",
                    self.reference, artifact.version, expected
                )));
            }
        }

        let model = LoadedModel::from_artifact(artifact)?;
        info!(
            reference = %self.reference,
            model_id = %model.descriptor().id,
            model_version = %model.descriptor().version,
            format = %model.format(),
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::MockModelStore;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn artifact_bytes(version: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "m",
            "version": version,
            "format": "dense_json",
            "schema": {"features": [{"name": "x", "type": "numeric"}]},
            "output": {"kind": "regression"},
            "network": {"input_dim": 1, "layers": [{"weights": [[2.0]], "bias": [1.0]}]}
        }))
        .unwrap()
    }

    fn loader_with(bytes: Vec<u8>) -> ModelLoader {
        let mut store = MockModelStore::new();
        store
            .expect_fetch()
            .returning(move |_, _| Ok(bytes.clone()));
        ModelLoader::new(
            StoreAccessor::new(Arc::new(store)),
            ArtifactReference::Local(PathBuf::from("model.json")),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn loads_matching_version() {
        let loader = loader_with(artifact_bytes("2.0")).with_version(Some("2.0".to_string()));
        let model = loader.load().await.unwrap();
        assert_eq!(model.descriptor().version, "2.0");
        assert_eq!(model.infer(&[3.0]).unwrap(), vec![7.0]);
    }

    #[tokio::test]
    async fn version_mismatch_is_corrupt() {
        let loader = loader_with(artifact_bytes("1.0")).with_version(Some("2.0".to_string()));
        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, PredictError::ArtifactCorrupt(_)));
        assert!(err.is_fatal());
    }
}
