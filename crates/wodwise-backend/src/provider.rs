//! OpenAI-compatible streaming chat completions client

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use wodwise_config::BackendConfig;
use wodwise_core::{extract_error_message, status_phrase_message};

use crate::error::{BackendError, Result};

/// Text fragments of one completion, in arrival order
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Content(String),
    Error(String),
    Done,
}

/// Decode the `data` of one provider event.
///
/// Returns `Ok(None)` for events that carry no text (role-only deltas,
/// finish reasons, usage).
pub fn parse_stream_chunk(
    data: &str,
) -> std::result::Result<Option<StreamChunk>, serde_json::Error> {
    if data == "[DONE]" {
        return Ok(Some(StreamChunk::Done));
    }

    let chunk: Value = serde_json::from_str(data)?;

    if chunk.get("error").is_some() {
        let message = extract_error_message(&chunk).unwrap_or_else(|| "provider error".to_string());
        return Ok(Some(StreamChunk::Error(message)));
    }

    let content = chunk["choices"]
        .get(0)
        .and_then(|choice| choice["delta"]["content"].as_str())
        .filter(|content| !content.is_empty());

    Ok(content.map(|content| StreamChunk::Content(content.to_string())))
}

#[derive(Debug, Clone)]
pub struct CompletionsClient {
    client: Client,
    endpoint: String,
}

impl CompletionsClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start a streaming completion.
    ///
    /// Provider rejections surface here as [`BackendError::Provider`]; failures
    /// after the first byte come through the returned stream.
    pub async fn stream_chat(
        &self,
        api_key: &str,
        model: &str,
        developer_message: &str,
        user_message: &str,
    ) -> Result<DeltaStream> {
        let body = CompletionBody {
            model,
            messages: vec![
                Message {
                    role: "system",
                    content: developer_message,
                },
                Message {
                    role: "user",
                    content: user_message,
                },
            ],
            stream: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.without_url().to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Provider responded");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = provider_error_message(&text).unwrap_or_else(|| {
                status_phrase_message(status.as_u16(), status.canonical_reason())
            });
            return Err(BackendError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            futures_util::pin_mut!(events);

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(BackendError::Stream(e.to_string()));
                        return;
                    }
                };

                match parse_stream_chunk(&event.data) {
                    Ok(Some(StreamChunk::Content(text))) => {
                        yield Ok(text);
                    }
                    Ok(Some(StreamChunk::Error(message))) => {
                        yield Err(BackendError::Stream(message));
                        return;
                    }
                    Ok(Some(StreamChunk::Done)) => return,
                    Ok(None) => {}
                    Err(e) => warn!("Failed to parse provider event: {} - data: {}", e, event.data),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Message of a provider error body: extracted from JSON, else the raw text
fn provider_error_message(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => extract_error_message(&value).or_else(|| Some(text.to_string())),
        Err(_) => Some(text.to_string()),
    }
}
