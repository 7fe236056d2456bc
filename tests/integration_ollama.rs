#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests for the Ollama client wire behavior, run against a
// local mock server so no real Ollama instance is needed.

use std::path::Path;
use std::time::Duration;

use docqa::RagError;
use docqa::config::Config;
use docqa::ollama::OllamaClient;
use docqa::rag::{Generator, ResponseStreamer, StreamFrame};
use docqa::retriever::Embedder;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::load(Path::new("/nonexistent")).expect("defaults should load");
    config.ollama.host = "127.0.0.1".to_string();
    config.ollama.port = server.address().port();
    config.ollama.embedding_model = "test-embed".to_string();
    config.ollama.batch_size = 16;
    config.generation.model = "test-gen".to_string();
    config
}

fn test_client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&test_config(server))
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(5))
        .with_generation_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
}

#[tokio::test]
async fn single_embedding_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.1, 0.2, 0.3]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let embedding = client.embed("hello world").await.expect("embed should succeed");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn batch_embedding_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["one", "two"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let embeddings = client
        .embed_batch(&["one".to_string(), "two".to_string()])
        .await
        .expect("batch embed should succeed");

    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[0], vec![1.0, 0.0]);
    assert_eq!(embeddings[1], vec![0.0, 1.0]);
}

#[tokio::test]
async fn mismatched_batch_response_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .embed_batch(&["one".to_string(), "two".to_string()])
        .await
        .expect_err("length mismatch should fail");

    assert!(matches!(err, RagError::Backend(_)));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server).with_retry_attempts(3);
    let err = client.embed("bad").await.expect_err("4xx should fail");
    assert!(matches!(err, RagError::Backend(_)));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.5]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server).with_retry_attempts(2);
    let embedding = client
        .embed("eventually works")
        .await
        .expect("retry should succeed");
    assert_eq!(embedding, vec![0.5]);
}

#[tokio::test]
async fn health_check_verifies_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "test-embed", "size": 100},
                {"name": "test-gen", "size": 200}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");
    assert!(result.is_ok(), "health check should pass: {:?}", result);
}

#[tokio::test]
async fn health_check_fails_on_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed", "size": 100}]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");
    assert!(result.is_err());
}

#[tokio::test]
async fn complete_generation_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "test-gen", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "The answer is 42."
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let answer = client
        .generate("What is the answer?")
        .await
        .expect("generation should succeed");
    assert_eq!(answer, "The answer is 42.");
}

#[tokio::test]
async fn streamed_generation_yields_increments_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"The \",\"done\":false}\n",
        "{\"response\":\"answer\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":false}\n",
        "{\"response\":\".\",\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let mut stream = client
        .generate_stream("question")
        .await
        .expect("stream should open");

    let mut text = String::new();
    while let Some(token) = stream.next().await {
        text.push_str(&token.expect("token should be ok"));
    }
    assert_eq!(text, "The answer.");
}

#[tokio::test]
async fn unreachable_backend_is_a_backend_error() {
    // Point the client at a closed port
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.ollama.port = 1;
    drop(server);

    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(1))
        .with_generation_timeout(Duration::from_secs(1))
        .with_retry_attempts(1);

    let err = client
        .generate_stream("question")
        .await
        .expect_err("unreachable backend should fail");
    assert!(matches!(err, RagError::Backend(_)));
}

#[tokio::test]
async fn midstream_error_interrupts_the_frame_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"partial\",\"done\":false}\n",
        "{\"error\":\"model crashed\"}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let tokens = client
        .generate_stream("question")
        .await
        .expect("stream should open");
    let mut streamer = ResponseStreamer::new(tokens, Vec::new());

    let first = streamer
        .next_frame()
        .await
        .expect("first frame")
        .expect("token frame");
    assert!(matches!(first, StreamFrame::Token { ref token, .. } if token == "partial"));

    let second = streamer.next_frame().await.expect("error outcome");
    assert!(matches!(
        second.expect_err("stream should fail"),
        RagError::GenerationInterrupted(_)
    ));

    assert!(streamer.next_frame().await.is_none());
}
