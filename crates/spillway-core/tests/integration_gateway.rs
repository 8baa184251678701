#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spillway_core::config::{BreakerConfig, GatewayConfig, GatewaySection, Provider};
use spillway_core::proxy::{build_proxy_router, GatewayState};

fn provider(name: &str, base_url: &str) -> Provider {
    Provider {
        name: name.to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        token: format!("upstream-{name}"),
    }
}

fn config(
    providers: Vec<Provider>,
    failure_threshold: u32,
    probe_probability: f64,
    access_token: &str,
    timeout: f64,
) -> GatewayConfig {
    GatewayConfig {
        gateway: GatewaySection {
            access_token: access_token.to_string(),
            timeout,
            circuit_breaker: BreakerConfig {
                failure_threshold,
                reset_timeout: 600.0,
                probe_probability,
            },
        },
        providers,
    }
}

async fn spawn_gateway(config: GatewayConfig) -> (String, GatewayState) {
    let state = GatewayState::new(config).expect("gateway state");
    let app = build_proxy_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), state)
}

fn chat_body() -> serde_json::Value {
    serde_json::json!({"model": "test-model", "messages": []})
}

#[tokio::test]
async fn test_single_healthy_provider() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "ok"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (gateway, state) =
        spawn_gateway(config(vec![provider("a", &upstream.uri())], 5, 0.0, "", 30.0)).await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"id": "ok"}));
    assert_eq!(state.registry.status()["a"].failure_count, 0);
}

#[tokio::test]
async fn test_primary_down_backup_serves() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "b"})))
        .expect(1)
        .mount(&backup)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        5,
        0.0,
        "",
        30.0,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["from"], "b");

    let status = state.registry.status();
    assert_eq!(status["a"].failure_count, 1);
    assert_eq!(status["b"].failure_count, 0);
}

#[tokio::test]
async fn test_breaker_opens_and_provider_is_skipped() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    // Exactly two requests reach the primary; the third is skipped by its
    // open breaker.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "b"})))
        .expect(3)
        .mount(&backup)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        2,
        0.0,
        "",
        30.0,
    ))
    .await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let response = client
            .post(format!("{gateway}/v1/chat/completions"))
            .json(&chat_body())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let status = state.registry.status();
    assert!(status["a"].is_open);
    assert_eq!(status["a"].failure_count, 2);
    assert!(!status["b"].is_open);
}

#[tokio::test]
async fn test_all_providers_fail_returns_502_summary() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    for upstream in [&primary, &backup] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(upstream)
            .await;
    }

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        2,
        0.0,
        "",
        30.0,
    ))
    .await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let response = client
            .post(format!("{gateway}/v1/chat/completions"))
            .json(&chat_body())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "all_providers_failed");
        assert_eq!(body["last_error"]["error_type"], "http_error");
        assert_eq!(body["last_error"]["provider"], "b");
    }

    // The fallback's counter keeps counting but its breaker never opens.
    let status = state.registry.status();
    assert!(status["a"].is_open);
    assert!(!status["b"].is_open);
    assert_eq!(status["b"].failure_count, 3);
}

#[tokio::test]
async fn test_502_body_lists_skipped_providers() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    for upstream in [&primary, &backup] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(upstream)
            .await;
    }

    let (gateway, _state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        5,
        0.0,
        "",
        30.0,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["providers_tried"], serde_json::json!(["a", "b"]));
}

#[tokio::test]
async fn test_4xx_passes_through_without_breaker_update() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "no such model"})),
        )
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backup)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        2,
        0.0,
        "",
        30.0,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "no such model");
    assert_eq!(state.registry.status()["a"].failure_count, 0);
}

#[tokio::test]
async fn test_auth_rejects_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let (gateway, _state) =
        spawn_gateway(config(vec![provider("a", &upstream.uri())], 5, 0.0, "gw-secret", 30.0))
            .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"error": "unauthorized"}));
}

#[tokio::test]
async fn test_access_token_substituted_for_provider_token() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer upstream-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "ok"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (gateway, _state) =
        spawn_gateway(config(vec![provider("a", &upstream.uri())], 5, 0.0, "gw-secret", 30.0))
            .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .header("authorization", "Bearer gw-secret")
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_probe_recovers_open_provider() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "b"})))
        .mount(&backup)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        1,
        1.0,
        "",
        30.0,
    ))
    .await;

    let client = reqwest::Client::new();

    // First request trips the primary and is served by the backup.
    let response = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(state.registry.status()["a"].is_open);

    // The primary recovers; with probe_probability = 1.0 the next request
    // probes it first and its breaker closes on success.
    primary.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "a"})))
        .mount(&primary)
        .await;

    let response = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["from"], "a");

    let status = state.registry.status();
    assert!(!status["a"].is_open);
    assert_eq!(status["a"].failure_count, 0);
}

#[tokio::test]
async fn test_attempt_deadline_fails_over() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"from": "slow"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"from": "fast"})))
        .expect(1)
        .mount(&fast)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &slow.uri()), provider("b", &fast.uri())],
        5,
        0.0,
        "",
        0.5,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["from"], "fast");
    assert_eq!(state.registry.status()["a"].failure_count, 1);
}

#[tokio::test]
async fn test_streaming_response_passes_through() {
    let upstream = MockServer::start().await;
    let payload = "data: hello\n\ndata: world\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(payload, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (gateway, state) =
        spawn_gateway(config(vec![provider("a", &upstream.uri())], 5, 0.0, "", 30.0)).await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&serde_json::json!({"model": "test-model", "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), payload);
    assert_eq!(state.registry.status()["a"].failure_count, 0);
}

#[tokio::test]
async fn test_streaming_fails_over_before_commit() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    let payload = "data: from-b\n\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(payload, "text/event-stream"))
        .expect(1)
        .mount(&backup)
        .await;

    let (gateway, state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        5,
        0.0,
        "",
        30.0,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&serde_json::json!({"model": "test-model", "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), payload);
    assert_eq!(state.registry.status()["a"].failure_count, 1);
}

#[tokio::test]
async fn test_streaming_exhaustion_returns_502() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    for upstream in [&primary, &backup] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(upstream)
            .await;
    }

    let (gateway, _state) = spawn_gateway(config(
        vec![provider("a", &primary.uri()), provider("b", &backup.uri())],
        5,
        0.0,
        "",
        30.0,
    ))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&serde_json::json!({"model": "test-model", "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "all_providers_failed");
    assert_eq!(body["providers_tried"], serde_json::json!(["a", "b"]));
}

#[tokio::test]
async fn test_method_path_and_query_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(wiremock::matchers::query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (gateway, _state) =
        spawn_gateway(config(vec![provider("a", &upstream.uri())], 5, 0.0, "", 30.0)).await;

    let response = reqwest::Client::new()
        .get(format!("{gateway}/v1/models?limit=5"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}
