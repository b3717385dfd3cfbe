//! HTTP Server - 提供 `/api/chat` 流式补全和健康检查

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Instrument};

use wodwise_config::BackendConfig;
use wodwise_core::STREAM_COMPLETE_MARKER;
use wodwise_observability::create_request_span;

use crate::error::{BackendError, Result};
use crate::provider::{CompletionsClient, DeltaStream};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// 聊天请求；`api_key` 缺省时使用配置中的认证
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub developer_message: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// 应用状态
#[derive(Clone)]
pub struct BackendState {
    pub provider: CompletionsClient,
    pub config: BackendConfig,
}

impl BackendState {
    pub fn new(config: BackendConfig) -> Result<Self> {
        Ok(Self {
            provider: CompletionsClient::new(&config)?,
            config,
        })
    }

    /// 请求携带的 key 优先，其次是配置
    fn resolve_api_key(&self, request: &CompletionRequest) -> Option<String> {
        request
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| self.config.auth.get_api_key())
    }
}

/// 运行 HTTP 服务器，直到收到 Ctrl-C
pub async fn run_server(state: BackendState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .map_err(|e| {
            BackendError::Address(format!(
                "{}:{} ({})",
                state.config.host, state.config.port, e
            ))
        })?;

    let listener = TcpListener::bind(addr).await?;
    info!("WODWise backend listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// 创建路由
pub fn create_router(state: BackendState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn chat_handler(State(state): State<Arc<BackendState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(&request_id);

    async move {
        match start_completion(&state, &body).await {
            Ok(deltas) => stream_response(deltas),
            Err(err) => {
                warn!("Chat request rejected: {}", err);
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn start_completion(state: &BackendState, body: &[u8]) -> Result<DeltaStream> {
    let request: CompletionRequest = serde_json::from_slice(body).map_err(|e| {
        debug!("Malformed chat request: {}", e);
        BackendError::InvalidBody
    })?;

    let user_message = request
        .user_message
        .as_deref()
        .filter(|message| !message.is_empty())
        .ok_or(BackendError::Validation)?;

    let api_key = state
        .resolve_api_key(&request)
        .ok_or(BackendError::MissingApiKey)?;

    let model = request
        .model
        .as_deref()
        .unwrap_or(&state.config.default_model);
    let developer_message = request
        .developer_message
        .as_deref()
        .unwrap_or(&state.config.default_developer_message);

    info!(model, "Chat request received");
    state
        .provider
        .stream_chat(&api_key, model, developer_message, user_message)
        .await
}

/// 把增量文本写成纯文本流
///
/// 结束时追加完成标记；中途失败则追加错误，且不带标记。
fn completion_body(deltas: DeltaStream) -> impl futures::Stream<Item = Bytes> + Send {
    async_stream::stream! {
        let mut deltas = deltas;
        let mut bytes = 0usize;

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    bytes += text.len();
                    yield Bytes::from(text);
                }
                Err(err) => {
                    warn!(bytes, "Provider failed mid-stream: {}", err);
                    yield Bytes::from(format!("\n\nError: {}", err));
                    return;
                }
            }
        }

        debug!(bytes, "Completion finished");
        yield Bytes::from_static(STREAM_COMPLETE_MARKER.as_bytes());
    }
}

fn stream_response(deltas: DeltaStream) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(completion_body(deltas).map(Ok::<_, Infallible>)),
    )
        .into_response()
}
