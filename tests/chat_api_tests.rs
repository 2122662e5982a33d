//! End-to-end chat tests
//!
//! Runs the real router on an ephemeral port against a wiremock Gemini
//! endpoint and reads the streamed body with reqwest.
//! Run with: cargo test --test chat_api_tests

use bedrock_assistant::api::{create_router, handlers::ServerState};
use bedrock_assistant::chat::ChatConfig;
use bedrock_assistant::{build_adapter, Config};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/models/gemini-2.0-flash:streamGenerateContent";

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|e| format!("data: {}\r\n\r\n", e))
        .collect()
}

fn text_event(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
}

fn finish_event(reason: &str) -> Value {
    json!({
        "candidates": [{ "finishReason": reason }],
        "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15 }
    })
}

fn config_for(gemini: &MockServer, api_key: Option<&str>) -> Config {
    Config {
        server_host: "127.0.0.1".into(),
        server_port: 0,
        max_request_bytes: 1024 * 1024,
        gemini_api_key: api_key.map(String::from),
        gemini_base_url: gemini.uri(),
        gemini_timeout_secs: 5,
        chat: ChatConfig::default(),
    }
}

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn_app(config: Config) -> String {
    let state = Arc::new(ServerState {
        adapter: build_adapter(&config).unwrap(),
        max_request_bytes: config.max_request_bytes,
    });
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_chat_streams_gemini_reply() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "how do I add a custom item?" }] },
                { "role": "model", "parts": [{ "text": "Create items/my_item.json" }] },
                { "role": "user", "parts": [{ "text": "and a recipe?" }] }
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse(&[
                    text_event("Add a "),
                    text_event("recipes/ file "),
                    text_event("with a `minecraft:recipe_shaped` ✓"),
                    finish_event("STOP"),
                ])),
        )
        .expect(1)
        .mount(&gemini)
        .await;

    let base = spawn_app(config_for(&gemini, Some("test-key"))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({
            "history": [
                { "role": "user", "parts": [{ "text": "how do I add a custom item?" }] },
                { "role": "model", "parts": [{ "text": "Create items/my_item.json" }] }
            ],
            "message": "and a recipe?"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "text/plain; charset=utf-8"
    );

    let mut received = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(
        String::from_utf8(received).unwrap(),
        "Add a recipes/ file with a `minecraft:recipe_shaped` ✓"
    );
}

#[tokio::test]
async fn test_system_instruction_and_image_forwarded() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(body_partial_json(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": "The user has provided the following image as part of their query:" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
            text_event("A grass block texture."),
            finish_event("STOP"),
        ])))
        .expect(1)
        .mount(&gemini)
        .await;

    let base = spawn_app(config_for(&gemini, Some("k"))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "message": "", "imageData": "data:image/png;base64,iVBORw0KGgo=" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "A grass block texture.");

    let requests = gemini.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let instruction = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(instruction.contains("Minecraft Bedrock"));
}

#[tokio::test]
async fn test_gemini_rejection_is_setup_failure() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&gemini)
        .await;

    let base = spawn_app(config_for(&gemini, Some("bad"))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("API key not valid"));
}

#[tokio::test]
async fn test_missing_api_key_never_calls_gemini() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gemini)
        .await;

    let base = spawn_app(config_for(&gemini, None)).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_blocked_reply_aborts_stream() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
            text_event("Here is"),
            finish_event("SAFETY"),
        ])))
        .mount(&gemini)
        .await;

    let base = spawn_app(config_for(&gemini, Some("k"))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut received = Vec::new();
    let mut failed = false;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => received.extend_from_slice(&bytes),
            Err(_) => {
                failed = true;
                break;
            }
        }
    }
    // The text that arrived is intact, but the body did not end cleanly
    assert_eq!(received, b"Here is");
    assert!(failed);
}

#[tokio::test]
async fn test_health() {
    let gemini = MockServer::start().await;
    let base = spawn_app(config_for(&gemini, Some("k"))).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "gemini");
}
