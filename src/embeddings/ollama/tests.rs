use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, dimension: u32) -> EmbeddingConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri should parse");
    EmbeddingConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().unwrap_or("127.0.0.1").to_string(),
        port: url.port().unwrap_or(80),
        model: "test-model".to_string(),
        dimension,
        normalize: false,
        batch_size: 2,
        max_input_tokens: 16,
        timeout_secs: 5,
        retry_attempts: 2,
    }
}

fn client(config: &EmbeddingConfig) -> OllamaClient {
    OllamaClient::new(config)
        .expect("should create client")
        .with_retry_policy(RetryPolicy::new(2).with_base_delay(Duration::ZERO))
}

#[test]
fn client_configuration() {
    let config = EmbeddingConfig {
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..EmbeddingConfig::default()
    };
    let client = OllamaClient::new(&config).expect("should create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension(), 384);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry.attempts, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_batches_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["first", "second"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["third"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.0, 0.0, 1.0]]})),
        )
        .mount(&server)
        .await;

    let client = client(&test_config(&server, 3));
    let texts = vec![
        "first".to_string(),
        "second".to_string(),
        "third".to_string(),
    ];
    let vectors = client.embed_batch(&texts).await.expect("should embed");

    assert_eq!(
        vectors,
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0]
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn normalizes_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[3.0, 4.0]]})))
        .mount(&server)
        .await;

    let mut config = test_config(&server, 2);
    config.normalize = true;
    let vector = client(&config).embed("hello").await.expect("should embed");

    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn truncates_long_inputs() {
    let server = MockServer::start().await;
    let long_text = "x".repeat(200);
    let expected = "x".repeat(64);
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": [expected]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0]]})))
        .expect(1)
        .mount(&server)
        .await;

    let vector = client(&test_config(&server, 2))
        .embed(&long_text)
        .await
        .expect("should embed truncated input");
    assert_eq!(vector.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_dimension_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0]]})))
        .mount(&server)
        .await;

    let result = client(&test_config(&server, 3)).embed("hello").await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_becomes_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let result = client(&test_config(&server, 3)).embed("hello").await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_accepts_latest_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-model:latest", "size": 1234}]
        })))
        .mount(&server)
        .await;

    let client = client(&test_config(&server, 3));
    let check = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");
    assert!(check.is_ok(), "health check failed: {check:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "other-model"}]
        })))
        .mount(&server)
        .await;

    let client = client(&test_config(&server, 3));
    let check = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");
    assert!(matches!(check, Err(RagError::Embedding(_))));
}
