use std::sync::Arc;

use k1s0_flipt_provider::{DisabledBooleanPolicy, FliptProvider, ProviderConfig};
use open_feature::provider::FeatureProvider;
use open_feature::{EvaluationContext, EvaluationErrorCode, EvaluationReason, StructValue, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> FliptProvider {
    FliptProvider::new(ProviderConfig::default().with_address(server.uri())).unwrap()
}

fn ctx() -> EvaluationContext {
    EvaluationContext::default()
        .with_targeting_key("user-1")
        .with_custom_field("plan", "pro")
        .with_custom_field("beta", true)
}

async fn mount_flag(server: &MockServer, namespace: &str, key: &str, enabled: bool) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/namespaces/{namespace}/flags/{key}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "key": key,
            "enabled": enabled,
            "namespaceKey": namespace
        })))
        .mount(server)
        .await;
}

async fn mount_evaluation(server: &MockServer, namespace: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/api/v1/namespaces/{namespace}/evaluate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_boolean_match_in_namespace() {
    let server = MockServer::start().await;
    mount_flag(&server, "flipt", "boolean-match", true).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/flipt/evaluate"))
        .and(body_partial_json(serde_json::json!({
            "flagKey": "boolean-match",
            "entityId": "user-1",
            "context": { "targetingKey": "user-1", "plan": "pro", "beta": "true" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "match": true,
            "flagKey": "boolean-match",
            "value": "false"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detail = provider(&server)
        .evaluate("flipt/boolean-match", true, &ctx())
        .await;
    assert!(!detail.value);
    assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
    assert!(detail.error.is_none());
}

#[tokio::test]
async fn test_flag_not_found_returns_default() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/default/flags/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "flag not found",
            "code": 5
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let detail = provider(&server)
        .evaluate("missing", "fallback".to_string(), &ctx())
        .await;
    assert_eq!(detail.value, "fallback");
    assert_eq!(detail.reason, EvaluationReason::Default);
    let error = detail.error.unwrap();
    assert_eq!(error.code, EvaluationErrorCode::FlagNotFound);
    assert_eq!(
        error.message.as_deref(),
        Some("flag \"default/missing\" not found")
    );
}

#[tokio::test]
async fn test_disabled_flag_skips_evaluation() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "dark-mode", false).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let detail = provider(&server)
        .evaluate("dark-mode", true, &ctx())
        .await;
    assert!(detail.value);
    assert_eq!(detail.reason, EvaluationReason::Disabled);
    assert!(detail.error.is_none());
}

#[tokio::test]
async fn test_disabled_boolean_legacy_policy_from_config() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "dark-mode", false).await;

    let config = ProviderConfig::default()
        .with_address(server.uri())
        .with_disabled_boolean(DisabledBooleanPolicy::ReturnFalse);
    let detail = FliptProvider::new(config)
        .unwrap()
        .evaluate("dark-mode", true, &ctx())
        .await;
    assert!(!detail.value);
    assert_eq!(detail.reason, EvaluationReason::Disabled);
}

#[tokio::test]
async fn test_object_attachment() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "theme", true).await;
    mount_evaluation(
        &server,
        "default",
        serde_json::json!({
            "match": true,
            "value": "dark",
            "attachment": "{\"foo\":\"bar\"}"
        }),
    )
    .await;

    let detail = provider(&server)
        .evaluate("theme", StructValue::default(), &ctx())
        .await;
    assert_eq!(
        detail.value.fields.get("foo"),
        Some(&Value::String("bar".to_string()))
    );
    assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
    assert_eq!(detail.variant.as_deref(), Some("dark"));
}

#[tokio::test]
async fn test_no_match_returns_default() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "limit", true).await;
    // protojson は false の match を省略する
    mount_evaluation(&server, "default", serde_json::json!({ "flagKey": "limit" })).await;

    let detail = provider(&server).evaluate("limit", 10i64, &ctx()).await;
    assert_eq!(detail.value, 10);
    assert_eq!(detail.reason, EvaluationReason::Default);
    assert!(detail.error.is_none());
}

#[tokio::test]
async fn test_numeric_type_mismatch() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "ratio", true).await;
    mount_evaluation(
        &server,
        "default",
        serde_json::json!({ "match": true, "value": "not-a-number" }),
    )
    .await;

    let p = provider(&server);
    let detail = p.evaluate("ratio", 0.25, &ctx()).await;
    assert_eq!(detail.value, 0.25);
    assert_eq!(detail.reason, EvaluationReason::Error);
    assert_eq!(detail.error.map(|e| e.code), Some(EvaluationErrorCode::TypeMismatch));

    let detail = p.evaluate("ratio", 4i64, &ctx()).await;
    assert_eq!(detail.value, 4);
    assert_eq!(detail.reason, EvaluationReason::Error);
    assert_eq!(detail.error.map(|e| e.code), Some(EvaluationErrorCode::TypeMismatch));
}

#[tokio::test]
async fn test_missing_targeting_key_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let context = EvaluationContext::default().with_custom_field("plan", "pro");
    let detail = provider(&server)
        .evaluate("flag", false, &context)
        .await;
    assert!(!detail.value);
    assert_eq!(detail.reason, EvaluationReason::Default);
    assert_eq!(
        detail.error.map(|e| e.code),
        Some(EvaluationErrorCode::TargetingKeyMissing)
    );
}

#[tokio::test]
async fn test_unreachable_service_is_provider_not_ready() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let p = FliptProvider::new(ProviderConfig::default().with_address(format!("http://{addr}")))
        .unwrap();

    let detail = p.evaluate("flag", "x".to_string(), &ctx()).await;
    assert_eq!(detail.value, "x");
    assert_eq!(detail.reason, EvaluationReason::Default);
    assert_eq!(
        detail.error.map(|e| e.code),
        Some(EvaluationErrorCode::ProviderNotReady)
    );
}

#[tokio::test]
async fn test_shared_provider_across_tasks() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "rollout", true).await;
    mount_evaluation(
        &server,
        "default",
        serde_json::json!({ "match": true, "value": "true" }),
    )
    .await;

    let p = Arc::new(provider(&server));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let p = Arc::clone(&p);
            tokio::spawn(async move {
                let context = EvaluationContext::default().with_targeting_key(format!("user-{i}"));
                p.evaluate("rollout", false, &context).await
            })
        })
        .collect();

    for handle in handles {
        let detail = handle.await.unwrap();
        assert!(detail.value);
        assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
    }
}

#[tokio::test]
async fn test_empty_flag_key_is_not_found() {
    let server = MockServer::start().await;
    // 空のキーで GET すると一覧 API に当たる
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/flipt/flags/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "flags": [{ "key": "a", "enabled": true }]
        })))
        .expect(0)
        .mount(&server)
        .await;

    let detail = provider(&server).evaluate("flipt/", true, &ctx()).await;
    assert!(detail.value);
    assert_eq!(detail.reason, EvaluationReason::Default);
    assert_eq!(
        detail.error.map(|e| e.code),
        Some(EvaluationErrorCode::FlagNotFound)
    );

    let err = provider(&server)
        .resolve_bool_value("", &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.code, EvaluationErrorCode::FlagNotFound);
}

#[tokio::test]
async fn test_sdk_resolution_over_http() {
    let server = MockServer::start().await;
    mount_flag(&server, "default", "color", true).await;
    mount_evaluation(
        &server,
        "default",
        serde_json::json!({ "match": true, "value": "blue" }),
    )
    .await;

    let p = provider(&server);
    assert_eq!(p.metadata().name, "flipt-provider");
    let details = p.resolve_string_value("color", &ctx()).await.unwrap();
    assert_eq!(details.value, "blue");
    assert_eq!(details.reason, Some(EvaluationReason::TargetingMatch));
    assert!(details.variant.is_none());
}
