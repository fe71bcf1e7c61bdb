//! Streaming integration tests against a mock OpenAI-compatible endpoint.

use futures::StreamExt;
use quickpane::chat::pipeline::{ChatEvent, ChatPipeline, ChatRequest};
use quickpane::chat::provider::{ChatProvider, OpenAiProvider};
use quickpane::models::{ChatMessage, Role};
use quickpane::settings::{Settings, SettingsStore};
use quickpane::storage::Database;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" from\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" mock\"}}]}\n\n",
    "data: [DONE]\n\n",
);

async fn mock_completions(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-int"))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_provider_streams_chunks_in_order() {
    let server = MockServer::start().await;
    mock_completions(
        &server,
        ResponseTemplate::new(200).set_body_raw(SSE_BODY.as_bytes().to_vec(), "text/event-stream"),
    )
    .await;

    let provider = OpenAiProvider::new(None, Some(server.uri()));
    let stream = provider
        .stream_chat("sk-int", &[ChatMessage::new(Role::User, "hi")])
        .await
        .unwrap();

    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
    assert_eq!(chunks, vec!["Hello", " from", " mock"]);
}

#[tokio::test]
async fn test_provider_surfaces_upstream_error() {
    let server = MockServer::start().await;
    mock_completions(&server, ResponseTemplate::new(401).set_body_string("unauthorized")).await;

    let provider = OpenAiProvider::new(None, Some(server.uri()));
    let result = provider
        .stream_chat("sk-int", &[ChatMessage::new(Role::User, "hi")])
        .await;

    let message = result.err().unwrap().to_string();
    assert!(message.contains("401"), "missing status in: {message}");
    assert!(message.contains("unauthorized"), "missing body in: {message}");
}

#[tokio::test]
async fn test_pipeline_end_to_end_over_http() {
    let server = MockServer::start().await;
    mock_completions(
        &server,
        ResponseTemplate::new(200).set_body_raw(SSE_BODY.as_bytes().to_vec(), "text/event-stream"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::init(dir.path()).await.unwrap());
    let settings = Arc::new(SettingsStore::new(dir.path()));
    settings
        .save(&Settings {
            api_key: "sk-int".to_string(),
            ..Settings::default()
        })
        .unwrap();

    let pipeline = ChatPipeline::new(
        db.clone(),
        settings,
        Arc::new(OpenAiProvider::new(None, Some(server.uri()))),
    );

    let mut rx = pipeline.submit(ChatRequest {
        messages: vec![ChatMessage::new(Role::User, "say hello")],
        context: Some("clipboard selection".to_string()),
        session_id: None,
    });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let session_id = match events.first() {
        Some(ChatEvent::SessionCreated(id)) => *id,
        other => panic!("expected SessionCreated first, got {:?}", other),
    };
    assert_eq!(events.last(), Some(&ChatEvent::Done));

    let history = db.get_history(session_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "say hello");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Hello from mock");
}
