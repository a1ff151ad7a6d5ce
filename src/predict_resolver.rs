//! Prediction entry point.
//!
//! envelope -> cached model -> validation -> inference -> formatting. Every
//! failure becomes an [`InvocationResult`] carrying its error kind.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, PredictError};
use crate::model::{LoadedModel, ModelCache, ModelLoader};
use crate::predict_service::{api_return, error_result, parse_envelope, InvocationResult};
use crate::response::{self, PredictionResponse};
use crate::services::Metrics;
use crate::validation;

/// Owns the process-scoped model cache and answers invocations.
///
/// Built once per execution environment and shared by `Arc`.
pub struct PredictResolver {
    cache: ModelCache<LoadedModel>,
    loader: ModelLoader,
    metrics: Arc<Metrics>,
}

impl PredictResolver {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            cache: ModelCache::new(),
            loader,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self::new(ModelLoader::from_config(config)?))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The loaded model, loading it on first use
    pub async fn model(&self) -> Result<Arc<LoadedModel>, PredictError> {
        self.cache
            .get_or_load(|| async {
                debug!(reference = %self.loader.reference(), "cold start: loading model");
                self.loader.load().await
            })
            .await
    }

    /// Load the model ahead of the first invocation
    pub async fn warm_up(&self) -> Result<(), PredictError> {
        self.model().await.map(|_| ())
    }

    /// Run the pipeline on an invocation event
    pub async fn resolve(&self, event: &Value) -> Result<PredictionResponse, PredictError> {
        let payload = parse_envelope(event)?;
        let model = self.model().await?;
        let request = validation::validate(&payload, model.schema())?;

        let worker_model = Arc::clone(&model);
        let output = tokio::task::spawn_blocking(move || worker_model.infer(request.input()))
            .await
            .map_err(|e| PredictError::InferenceError(format!("inference worker failed: {e}")))??;

        response::format(&output, model.output_spec(), model.descriptor())
    }

    /// Answer an invocation; never fails
    pub async fn handle(&self, event: &Value) -> InvocationResult {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let outcome = self.resolve(event).await;
        let latency = started.elapsed();
        let latency_ms = latency.as_secs_f64() * 1000.0;

        match outcome {
            Ok(prediction) => {
                self.metrics.record_success(latency);
                info!(
                    %request_id,
                    latency_ms,
                    label = prediction.label.as_deref().unwrap_or("-"),
                    score = prediction.score.unwrap_or(f64::NAN),
                    "prediction served"
                );
                api_return(&prediction, 200, None)
            }
            Err(err) => {
                self.metrics.record_failure(err.kind(), latency);
                if err.is_client_error() {
                    warn!(%request_id, latency_ms, kind = %err.kind(), "rejected request: {}", err);
                } else {
                    error!(
                        %request_id,
                        latency_ms,
                        kind = %err.kind(),
                        retryable = err.is_retryable(),
                        "prediction failed: {}",
                        err
                    );
                }
                error_result(&err)
            }
        }
    }

    pub fn is_warm(&self) -> bool {
        self.cache.is_warm()
    }

    /// Model loads so far (cold starts plus retries after transient failures)
    pub fn load_count(&self) -> u64 {
        self.cache.load_count()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Release the cached model at the end of the execution environment
    pub fn teardown(mut self) {
        self.cache.teardown();
        self.metrics.log_status(self.cache.load_count());
    }
}

/// Handle one invocation event
pub async fn predict(resolver: &PredictResolver, event: &Value) -> InvocationResult {
    resolver.handle(event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{ArtifactReference, ModelStore, StoreAccessor};
    use crate::model::store::MockModelStore;
    use crate::predict_service::proxy_event;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn credit_artifact() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "credit-approval",
            "version": "1.0.0",
            "format": "dense_json",
            "schema": {"features": [
                {"name": "age", "type": "numeric"},
                {"name": "income", "type": "numeric"}
            ]},
            "output": {"kind": "binary", "labels": ["declined", "approved"], "decimals": 2},
            "network": {
                "input_dim": 2,
                "input_mean": [40.0, 50000.0],
                "input_std": [12.0, 20000.0],
                "layers": [{"weights": [[-0.4, 1.5]], "bias": [1.10], "activation": "sigmoid"}]
            }
        }))
        .unwrap()
    }

    fn resolver_with(store: impl ModelStore + 'static) -> PredictResolver {
        let loader = ModelLoader::new(
            StoreAccessor::new(Arc::new(store)),
            ArtifactReference::Local(PathBuf::from("model.json")),
            Duration::from_secs(1),
        );
        PredictResolver::new(loader)
    }

    fn healthy_store() -> MockModelStore {
        let mut store = MockModelStore::new();
        store
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(credit_artifact()));
        store
    }

    #[tokio::test]
    async fn test_valid_request_is_scored() {
        let resolver = resolver_with(healthy_store());
        let event = proxy_event(r#"{"age": 34, "income": 52000}"#);

        let result = predict(&resolver, &event).await;
        assert_eq!(result.status_code, 200);
        assert!(result.error_message.is_none());

        let body = result.body_json().unwrap();
        assert_eq!(body["label"], "approved");
        assert_eq!(body["score"], 0.81);
        assert_eq!(body["model"]["id"], "credit-approval");
    }

    #[tokio::test]
    async fn test_model_is_loaded_once_across_invocations() {
        let resolver = resolver_with(healthy_store());
        assert!(!resolver.is_warm());

        for body in [r#"{"age": 34, "income": 52000}"#, r#"{"age": 61, "income": 18000}"#] {
            assert!(resolver.handle(&proxy_event(body)).await.is_success());
        }
        assert!(resolver.is_warm());
        assert_eq!(resolver.load_count(), 1);
    }

    #[tokio::test]
    async fn test_client_errors_map_to_400() {
        let resolver = resolver_with(healthy_store());

        let result = resolver.handle(&proxy_event(r#"{"age": "thirty-four"}"#)).await;
        assert_eq!(result.status_code, 400);
        let body = result.body_json().unwrap();
        assert_eq!(body["error"]["kind"], "type_mismatch");
        assert_eq!(body["error"]["fields"], json!(["age"]));

        let result = resolver.handle(&proxy_event(r#"{"age": 34}"#)).await;
        let body = result.body_json().unwrap();
        assert_eq!(body["error"]["kind"], "schema_mismatch");
        assert_eq!(body["error"]["fields"], json!(["income"]));

        let result = resolver.handle(&json!({"headers": {}})).await;
        assert_eq!(result.status_code, 400);

        let metrics = resolver.metrics();
        assert_eq!(metrics.errors(ErrorKind::TypeMismatch), 1);
        assert_eq!(metrics.errors(ErrorKind::SchemaMismatch), 1);
        assert_eq!(metrics.errors(ErrorKind::MalformedRequest), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_memoized() {
        let mut store = MockModelStore::new();
        store
            .expect_fetch()
            .times(1)
            .returning(|r, _| Err(PredictError::ArtifactNotFound(r.to_string())));
        let resolver = resolver_with(store);

        for _ in 0..3 {
            let result = resolver.handle(&proxy_event(r#"{"age": 34, "income": 52000}"#)).await;
            assert_eq!(result.status_code, 500);
            assert_eq!(result.body_json().unwrap()["error"]["kind"], "artifact_not_found");
        }
    }

    #[tokio::test]
    async fn test_teardown() {
        let resolver = resolver_with(healthy_store());
        resolver.warm_up().await.unwrap();
        assert!(resolver.is_warm());
        resolver.teardown();
    }
}
