use std::fmt::Display;

use futures::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, warn};

use wodwise_config::ClientConfig;
use wodwise_core::{ChatRequest, Progress, StreamAccumulator, StreamState};

use crate::error::{format_error_message, ConsumerError};

/// Drives relay calls and turns each response into [`StreamState`] snapshots.
///
/// Every call is independent; nothing is kept between turns.
#[derive(Debug, Clone)]
pub struct StreamConsumer {
    client: Client,
    endpoint: String,
    model: Option<String>,
    developer_message: Option<String>,
}

impl StreamConsumer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: None,
            developer_message: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut consumer = Self::new(config.relay_url.clone());
        consumer.model = config.model.clone();
        consumer.developer_message = config.developer_message.clone();
        consumer
    }

    /// Model used when a request does not name one
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Developer message used when a request does not carry one
    pub fn with_developer_message(mut self, message: impl Into<String>) -> Self {
        self.developer_message = Some(message.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fill fields the request leaves unset from the consumer defaults
    pub fn prepare(&self, mut request: ChatRequest) -> ChatRequest {
        if request.model.is_none() {
            request.model = self.model.clone();
        }
        if request.developer_message.is_none() {
            request.developer_message = self.developer_message.clone();
        }
        request
    }

    /// Whether the relay answers its health endpoint
    pub async fn health_check(&self) -> bool {
        let url = match self.endpoint.strip_suffix("/chat") {
            Some(base) => format!("{}/health", base),
            None => return false,
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Issue one chat turn.
    ///
    /// Yields a snapshot per growth of the text and always ends with exactly
    /// one terminal snapshot (`completed = true`), including on failure.
    pub fn consume(
        &self,
        request: ChatRequest,
    ) -> impl Stream<Item = StreamState> + Send + 'static {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let request = self.prepare(request);

        async_stream::stream! {
            let response = match client.post(&endpoint).json(&request).send().await {
                Ok(response) => response,
                Err(err) => {
                    let err = ConsumerError::from(err);
                    warn!("Relay request failed: {}", err);
                    yield StreamState::failed(format_error_message(&err.to_string()));
                    return;
                }
            };

            if !response.status().is_success() {
                let err = ConsumerError::from_response(response).await;
                warn!(status = err.status(), "Relay returned an error: {}", err);
                yield StreamState::failed(format_error_message(&err.to_string()));
                return;
            }

            let states = drive(response.bytes_stream());
            futures_util::pin_mut!(states);
            while let Some(state) = states.next().await {
                yield state;
            }
        }
    }

    /// Run one turn to completion and return the terminal snapshot
    pub async fn consume_to_end(&self, request: ChatRequest) -> StreamState {
        let states = self.consume(request);
        futures_util::pin_mut!(states);

        let mut last = None;
        while let Some(state) = states.next().await {
            last = Some(state);
        }
        last.unwrap_or_else(|| {
            StreamState::failed(format_error_message("stream ended without a state"))
        })
    }
}

/// Read loop over any chunk stream.
///
/// Stops polling `chunks` as soon as a sentinel is found; a read error ends
/// the turn with the partial text kept and `failure` set.
pub fn drive<S, B, E>(chunks: S) -> impl Stream<Item = StreamState>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    async_stream::stream! {
        let mut accumulator = StreamAccumulator::new();
        futures_util::pin_mut!(chunks);

        while let Some(next) = chunks.next().await {
            match next {
                Ok(chunk) => match accumulator.push(chunk.as_ref()) {
                    Progress::Pending => {}
                    Progress::Grew(state) => {
                        yield state;
                    }
                    Progress::Done(state) => {
                        debug!(completion = ?state.completion, "Sentinel received");
                        yield state;
                        return;
                    }
                },
                Err(err) => {
                    warn!("Stream read failed: {}", err);
                    yield accumulator.fail(format_error_message(&err.to_string()));
                    return;
                }
            }
        }

        let state = accumulator.finish();
        debug!(len = state.accumulated_text.len(), "Stream closed by relay");
        yield state;
    }
}
