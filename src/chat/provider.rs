use crate::error::ChatError;
use crate::models::ChatMessage;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Incremental text fragments, terminated by completion or a single error.
/// The stream is lazy, finite and not restartable.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// A provider that accepts a conversation and yields text chunks.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn stream_chat(
        &self,
        api_key: &str,
        conversation: &[ChatMessage],
    ) -> Result<ChunkStream, ChatError>;
}

/// OpenAI Chat Completions streaming client. Works with OpenAI-compatible
/// endpoints via `base_url`, which is also how tests point it at a mock.
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn stream_chat(
        &self,
        api_key: &str,
        conversation: &[ChatMessage],
    ) -> Result<ChunkStream, ChatError> {
        let body = WireRequest {
            model: &self.model,
            messages: conversation
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: true,
        };

        tracing::debug!("openai stream request: model={}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider(format!(
                "API error: status={status}, body={body}"
            )));
        }

        let byte_stream = Box::pin(response.bytes_stream());
        Ok(Box::pin(decode_sse(byte_stream)))
    }
}

/// Decode an SSE byte stream into the non-empty text deltas it carries.
/// Events are framed by blank lines; `data: [DONE]` terminates the stream.
fn decode_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // Consume complete SSE events already buffered.
                if let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.replace_range(..pos + 2, "");

                    let mut data = None;
                    for line in event.lines() {
                        if let Some(d) = line.strip_prefix("data: ") {
                            data = Some(d.to_string());
                        }
                    }

                    if let Some(data) = data {
                        if data == "[DONE]" {
                            return None;
                        }
                        if let Some(content) = parse_delta(&data) {
                            return Some((Ok(content), (stream, buffer)));
                        }
                    }
                    continue;
                }

                // Need more bytes.
                match stream.next().await {
                    Some(Ok(bytes)) => buffer.push_str(&String::from_utf8_lossy(&bytes)),
                    Some(Err(e)) => {
                        return Some((
                            Err(ChatError::Provider(format!("stream read error: {e}"))),
                            (stream, buffer),
                        ));
                    }
                    None => return None,
                }
            }
        },
    )
}

fn parse_delta(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let content = chunk.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(
        parts: Vec<Result<&'static str, &'static str>>,
    ) -> Pin<Box<dyn Stream<Item = Result<Bytes, &'static str>> + Send>> {
        Box::pin(futures::stream::iter(
            parts.into_iter().map(|p| p.map(Bytes::from)),
        ))
    }

    async fn collect(stream: impl Stream<Item = Result<String, ChatError>>) -> Vec<Result<String, String>> {
        stream
            .map(|r| r.map_err(|e| e.to_string()))
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_decodes_deltas_in_order() {
        let stream = bytes_stream(vec![Ok(concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
            "data: [DONE]\n\n",
        ))]);

        let chunks = collect(decode_sse(stream)).await;
        assert_eq!(chunks, vec![Ok("Hello".to_string()), Ok(", world".to_string())]);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let stream = bytes_stream(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel"),
            Ok("lo\"}}]}\n\ndata: [DONE]\n\n"),
        ]);

        let chunks = collect(decode_sse(stream)).await;
        assert_eq!(chunks, vec![Ok("Hello".to_string())]);
    }

    #[tokio::test]
    async fn test_read_error_is_surfaced() {
        let stream = bytes_stream(vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"),
            Err("connection reset"),
        ]);

        let chunks = collect(decode_sse(stream)).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Ok("partial".to_string()));
        assert!(chunks[1].as_ref().unwrap_err().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stream_end_without_done_marker() {
        let stream = bytes_stream(vec![Ok(
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n\n",
        )]);

        let chunks = collect(decode_sse(stream)).await;
        assert_eq!(chunks, vec![Ok("tail".to_string())]);
    }
}
