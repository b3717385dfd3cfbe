//! HTTP Server - 提供 `/api/chat` 流式转发和健康检查

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
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use wodwise_config::RelayConfig;
use wodwise_core::{ChatRequest, RelayError};
use wodwise_observability::create_request_span;

use crate::error::{ApiError, Result, ServerError};
use crate::relay::{RelayService, RelayStream};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayService,
}

impl AppState {
    pub fn new(relay: RelayService) -> Self {
        Self { relay }
    }
}

/// 运行 HTTP 服务器，直到收到 Ctrl-C
pub async fn run_server(config: &RelayConfig, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Address(format!("{}:{} ({})", config.host, config.port, e)))?;

    let listener = TcpListener::bind(addr).await?;
    info!("WODWise relay listening on http://{}", addr);

    serve(listener, create_router(state, config.cors)).await
}

/// 在已绑定的监听器上提供服务
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    axum::serve(listener, router)
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
pub fn create_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state));

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// 健康检查处理器
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// 聊天转发处理器
///
/// 请求体手动解析：非法 JSON 返回 500 而不是 axum 默认的 4xx。
async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(&request_id);

    async move {
        let request: ChatRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed chat request: {}", e);
                return ApiError(RelayError::InvalidBody).into_response();
            }
        };

        info!(
            model = request.model.as_deref().unwrap_or("default"),
            "Chat request received"
        );

        match state.relay.relay_with_id(request, &request_id).await {
            Ok(stream) => stream_response(stream),
            Err(err) => ApiError(err).into_response(),
        }
    }
    .instrument(span)
    .await
}

fn stream_response(stream: RelayStream) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(stream.map(Ok::<_, Infallible>)),
    )
        .into_response()
}
