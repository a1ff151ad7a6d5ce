use lambda_api::config::AppConfig;
use lambda_api::predict_service::{proxy_event, CLIENT_ERROR_STATUS_CODE, SUCCESS_STATUS_CODE};
use lambda_api::{predict, predict_service, PredictResolver, PredictionResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const CREDIT_MODEL: &str = include_str!("../model/model.json");

struct TempArtifact(PathBuf);

impl TempArtifact {
    fn write(contents: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("lambda-api-{}.json", Uuid::new_v4()));
        std::fs::write(&path, contents).expect("failed to write artifact");
        Self(path)
    }

    fn reference(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn resolver_for(config: &AppConfig) -> PredictResolver {
    PredictResolver::from_config(config).expect("failed to build resolver")
}

async fn invoke(resolver: &PredictResolver, body: Value) -> (u16, Value) {
    let result = predict(resolver, &proxy_event(&body.to_string())).await;
    let parsed = result.body_json().expect("body is not JSON");
    (result.status_code, parsed)
}

#[tokio::test]
async fn credit_model_scores_applicants() {
    let artifact = TempArtifact::write(CREDIT_MODEL.as_bytes());
    let resolver = resolver_for(&AppConfig::for_reference(&artifact.reference()));

    let (status, body) = invoke(&resolver, json!({"age": 34, "income": 52000})).await;
    assert_eq!(status, SUCCESS_STATUS_CODE);
    let response: PredictionResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.label.as_deref(), Some("approved"));
    assert_eq!(response.score, Some(0.81));
    assert_eq!(response.model.id, "credit-approval");
    assert_eq!(response.model.version, "1.0.0");

    let (status, body) = invoke(&resolver, json!({"age": 61, "income": 18000})).await;
    assert_eq!(status, SUCCESS_STATUS_CODE);
    assert_eq!(body["label"], "declined");
    assert_eq!(body["score"], 0.12);
}

#[tokio::test]
async fn wrong_type_and_missing_feature_are_client_errors() {
    let artifact = TempArtifact::write(CREDIT_MODEL.as_bytes());
    let resolver = resolver_for(&AppConfig::for_reference(&artifact.reference()));

    let (status, body) = invoke(&resolver, json!({"age": "thirty-four"})).await;
    assert_eq!(status, CLIENT_ERROR_STATUS_CODE);
    assert_eq!(body["error"]["kind"], "type_mismatch");
    assert_eq!(body["error"]["fields"], json!(["age"]));

    let (status, body) = invoke(&resolver, json!({"age": 34})).await;
    assert_eq!(status, CLIENT_ERROR_STATUS_CODE);
    assert_eq!(body["error"]["kind"], "schema_mismatch");
    assert_eq!(body["error"]["fields"], json!(["income"]));
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn legacy_positional_payloads_are_accepted() {
    let artifact = TempArtifact::write(CREDIT_MODEL.as_bytes());
    let resolver = resolver_for(&AppConfig::for_reference(&artifact.reference()));

    for payload in [json!({"data": [34, 52000]}), json!([34, 52000])] {
        let (status, body) = invoke(&resolver, payload).await;
        assert_eq!(status, SUCCESS_STATUS_CODE);
        assert_eq!(body["label"], "approved");
    }
}

#[tokio::test]
async fn missing_artifact_reports_not_found_every_time() {
    let missing = std::env::temp_dir().join(format!("lambda-api-missing-{}.json", Uuid::new_v4()));
    let resolver = resolver_for(&AppConfig::for_reference(&missing.to_string_lossy()));

    for _ in 0..3 {
        let (status, body) = invoke(&resolver, json!({"age": 34, "income": 52000})).await;
        assert_eq!(status, 500);
        assert_eq!(body["error"]["kind"], "artifact_not_found");
    }
    assert!(!resolver.is_warm());
    assert_eq!(resolver.load_count(), 1);
}

#[tokio::test]
async fn checksum_mismatch_is_corrupt() {
    let artifact = TempArtifact::write(CREDIT_MODEL.as_bytes());
    let mut config = AppConfig::for_reference(&artifact.reference());
    config.model.sha256 = Some("0".repeat(64));
    let resolver = resolver_for(&config);

    let (status, body) = invoke(&resolver, json!({"age": 34, "income": 52000})).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["kind"], "artifact_corrupt");

    config.model.sha256 = Some(hex::encode(Sha256::digest(CREDIT_MODEL.as_bytes())));
    let resolver = resolver_for(&config);
    let (status, _) = invoke(&resolver, json!({"age": 34, "income": 52000})).await;
    assert_eq!(status, SUCCESS_STATUS_CODE);
}

#[tokio::test]
async fn malformed_events_are_rejected_before_loading() {
    let missing = std::env::temp_dir().join(format!("lambda-api-missing-{}.json", Uuid::new_v4()));
    let resolver = resolver_for(&AppConfig::for_reference(&missing.to_string_lossy()));

    let result = predict(&resolver, &json!({"body": "{\"age\": 34,"})).await;
    assert_eq!(result.status_code, CLIENT_ERROR_STATUS_CODE);
    assert_eq!(result.body_json().unwrap()["error"]["kind"], "malformed_request");
    assert!(predict_service::is_fail_status_code(result.status_code));
    assert_eq!(resolver.load_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_invocations_share_one_load() {
    let artifact = TempArtifact::write(CREDIT_MODEL.as_bytes());
    let resolver = Arc::new(resolver_for(&AppConfig::for_reference(&artifact.reference())));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                let body = json!({"age": 20 + i, "income": 40000 + i * 1000}).to_string();
                resolver.handle(&proxy_event(&body)).await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().is_success());
    }
    assert_eq!(resolver.load_count(), 1);
}
