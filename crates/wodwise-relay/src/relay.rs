//! Upstream relay
//!
//! Forwards one chat request to the completions endpoint and hands back the
//! response body as a live byte stream. Nothing is buffered beyond the chunk
//! in flight and nothing is appended.

use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace, warn};

use wodwise_config::UpstreamConfig;
use wodwise_core::{ChatRequest, RelayError};

use crate::error::{Result, ServerError};

/// Body of a successful relay, chunk for chunk as received from upstream
pub type RelayStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Relays chat requests to a single upstream endpoint.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct RelayService {
    client: Client,
    upstream_url: String,
}

impl RelayService {
    /// Build the service and its HTTP client from configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .default_headers(build_headers(config)?);

        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }

        Ok(Self {
            client: builder.build()?,
            upstream_url: config.url.clone(),
        })
    }

    /// Endpoint requests are forwarded to
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Relay one request.
    ///
    /// Errors are only returned before the first byte is forwarded. Once the
    /// stream is handed out, an upstream failure ends it early.
    pub async fn relay(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<RelayStream, RelayError> {
        self.relay_with_id(request, "-").await
    }

    /// [`relay`](Self::relay) with a request id used in log lines
    pub async fn relay_with_id(
        &self,
        request: ChatRequest,
        request_id: &str,
    ) -> std::result::Result<RelayStream, RelayError> {
        let upstream = request.into_upstream()?;
        let started = Instant::now();

        debug!(
            request_id,
            model = upstream.model.as_deref().unwrap_or("default"),
            "Sending request to {}",
            self.upstream_url
        );

        let response = self
            .client
            .post(&self.upstream_url)
            .json(&upstream)
            .send()
            .await
            .map_err(|err| {
                let reason = describe_transport_error(err);
                warn!(request_id, "Upstream unreachable: {}", reason);
                RelayError::unavailable(format!("API Error: {}", reason))
            })?;

        let status = response.status();
        debug!(request_id, status = status.as_u16(), "Upstream responded");

        if !status.is_success() {
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(request_id, "Failed to read upstream error body: {}", err);
                    Bytes::new()
                }
            };
            let err = RelayError::from_upstream_response(
                status.as_u16(),
                status.canonical_reason(),
                &body,
            );
            warn!(request_id, status = status.as_u16(), "Upstream rejected request: {}", err);
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            warn!(request_id, status = status.as_u16(), "Upstream returned no body");
            return Err(RelayError::EmptyBody);
        }

        Ok(forward(response, request_id.to_string(), started))
    }
}

fn build_headers(config: &UpstreamConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ServerError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ServerError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Error text without the upstream URL, including the underlying cause
fn describe_transport_error(err: reqwest::Error) -> String {
    let err = err.without_url();
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

/// Per-stream bookkeeping; logs a disconnect when dropped mid-stream
struct ForwardStats {
    request_id: String,
    started: Instant,
    chunks: usize,
    bytes: usize,
    finished: bool,
}

impl ForwardStats {
    fn record(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len;
        trace!(request_id = %self.request_id, len, "Forwarding chunk");
    }

    fn complete(&mut self) {
        self.finished = true;
        debug!(
            request_id = %self.request_id,
            chunks = self.chunks,
            bytes = self.bytes,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Upstream stream complete"
        );
    }

    fn abort(&mut self, err: &reqwest::Error) {
        self.finished = true;
        warn!(
            request_id = %self.request_id,
            chunks = self.chunks,
            bytes = self.bytes,
            "Upstream stream failed mid-way, ending response early: {}",
            err
        );
    }
}

impl Drop for ForwardStats {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                request_id = %self.request_id,
                chunks = self.chunks,
                bytes = self.bytes,
                "Client disconnected before upstream finished"
            );
        }
    }
}

fn forward(response: reqwest::Response, request_id: String, started: Instant) -> RelayStream {
    let stream = async_stream::stream! {
        let mut stats = ForwardStats {
            request_id,
            started,
            chunks: 0,
            bytes: 0,
            finished: false,
        };
        let body = response.bytes_stream();
        futures_util::pin_mut!(body);

        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    stats.record(chunk.len());
                    yield chunk;
                }
                Some(Err(err)) => {
                    stats.abort(&err);
                    break;
                }
                None => {
                    stats.complete();
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}
