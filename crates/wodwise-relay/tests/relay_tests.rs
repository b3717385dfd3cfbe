use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{body::Body, routing::post, Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use wodwise_config::UpstreamConfig;
use wodwise_relay::{create_router, AppState, RelayService};

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_relay(upstream_url: String) -> String {
    let config = UpstreamConfig {
        url: upstream_url,
        ..UpstreamConfig::default()
    };
    let relay = RelayService::new(&config).unwrap();
    spawn(create_router(AppState::new(relay), false)).await
}

/// Upstream that streams the given chunks with a pause between each
fn chunked_upstream(chunks: Vec<&'static str>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move || {
            let chunks = chunks.clone();
            async move {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        yield Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()));
                    }
                };
                Body::from_stream(stream)
            }
        }),
    )
}

async fn post_chat(relay: &str, body: impl Into<reqwest::Body>) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/chat", relay))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

async fn error_of(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap();
    (status, body["error"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_missing_user_message_never_reaches_upstream() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("POST", "/api/chat")
        .expect(0)
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    for body in [
        r#"{}"#,
        r#"{"user_message": ""}"#,
        r#"{"user_message": null, "model": "m1"}"#,
    ] {
        let response = post_chat(&relay, body).await;
        assert_eq!(
            error_of(response).await,
            (400, "Missing required parameters".to_string())
        );
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_internal_error() {
    let relay = spawn_relay("http://127.0.0.1:9/api/chat".to_string()).await;

    let response = post_chat(&relay, "not json").await;
    assert_eq!(
        error_of(response).await,
        (500, "Internal server error".to_string())
    );
}

#[tokio::test]
async fn test_request_is_forwarded_and_streamed_back() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::Json(json!({
            "user_message": "hello",
            "model": "m1"
        })))
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("Hi there\n\n__STREAM_COMPLETE__")
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    let response = post_chat(&relay, r#"{"user_message": "hello", "model": "m1"}"#).await;

    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
    assert!(headers.get("content-length").is_none());

    let body = response.text().await.unwrap();
    assert_eq!(body, "Hi there\n\n__STREAM_COMPLETE__");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chunks_arrive_unmodified_and_in_order() {
    let chunks = vec!["Hi", " there", " ✓", "\n\n", "__STREAM_COMPLETE__"];
    let upstream = spawn(chunked_upstream(chunks.clone())).await;
    let relay = spawn_relay(format!("{}/api/chat", upstream)).await;

    let response = post_chat(&relay, r#"{"user_message": "hello"}"#).await;
    assert_eq!(response.status(), 200);

    let body = response.bytes().await.unwrap();
    assert_eq!(body, Bytes::from(chunks.concat()));
}

/// Sets the flag when the upstream body stream is dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Upstream that sends "first", then a "." every 100ms until it is dropped
fn endless_upstream(dropped: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move || {
            let dropped = dropped.clone();
            async move {
                let stream = async_stream::stream! {
                    let _flag = DropFlag(dropped);
                    yield Ok::<_, std::io::Error>(Bytes::from_static(b"first"));
                    loop {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        yield Ok(Bytes::from_static(b"."));
                    }
                };
                Body::from_stream(stream)
            }
        }),
    )
}

#[tokio::test]
async fn test_first_chunk_forwarded_while_upstream_stalls() {
    let upstream = Router::new().route(
        "/api/chat",
        post(|| async {
            let stream = async_stream::stream! {
                yield Ok::<_, std::io::Error>(Bytes::from_static(b"first"));
                tokio::time::sleep(Duration::from_secs(3)).await;
                yield Ok(Bytes::from_static(b"second"));
            };
            Body::from_stream(stream)
        }),
    );
    let upstream = spawn(upstream).await;
    let relay = spawn_relay(format!("{}/api/chat", upstream)).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    assert_eq!(response.status(), 200);

    let mut body = Box::pin(response.bytes_stream());
    let first = tokio::time::timeout(Duration::from_secs(1), body.next())
        .await
        .expect("first chunk was held until the upstream finished")
        .unwrap()
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"first"));
}

#[tokio::test]
async fn test_client_abort_stops_upstream_read() {
    let dropped = Arc::new(AtomicBool::new(false));
    let upstream = spawn(endless_upstream(dropped.clone())).await;
    let relay = spawn_relay(format!("{}/api/chat", upstream)).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    let mut body = Box::pin(response.bytes_stream());
    let first = tokio::time::timeout(Duration::from_secs(1), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"first"));
    assert!(!dropped.load(Ordering::SeqCst));

    drop(body);

    let released = tokio::time::timeout(Duration::from_secs(3), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "upstream body still being read after client abort");
}

#[tokio::test]
async fn test_upstream_json_error_is_mirrored() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/api/chat")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"rate limited"}"#)
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    assert_eq!(error_of(response).await, (503, "rate limited".to_string()));
}

#[tokio::test]
async fn test_upstream_non_json_error_uses_status_phrase() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/api/chat")
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    assert_eq!(
        error_of(response).await,
        (502, "API Error: Bad Gateway".to_string())
    );
}

#[tokio::test]
async fn test_upstream_detail_and_nested_messages() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::PartialJson(json!({"user_message": "a"})))
        .with_status(400)
        .with_body(r#"{"detail":"No API key provided and no default API key found"}"#)
        .create_async()
        .await;
    upstream
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::PartialJson(json!({"user_message": "b"})))
        .with_status(401)
        .with_body(r#"{"error":{"message":"invalid key"}}"#)
        .create_async()
        .await;
    upstream
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::PartialJson(json!({"user_message": "c"})))
        .with_status(500)
        .with_body(r#"{"status":"broken"}"#)
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    let response = post_chat(&relay, r#"{"user_message": "a"}"#).await;
    assert_eq!(
        error_of(response).await,
        (400, "No API key provided and no default API key found".to_string())
    );

    let response = post_chat(&relay, r#"{"user_message": "b"}"#).await;
    assert_eq!(error_of(response).await, (401, "invalid key".to_string()));

    let response = post_chat(&relay, r#"{"user_message": "c"}"#).await;
    assert_eq!(error_of(response).await, (500, "Unknown API error".to_string()));
}

#[tokio::test]
async fn test_upstream_without_body_is_reported() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/api/chat")
        .with_status(204)
        .create_async()
        .await;
    let relay = spawn_relay(format!("{}/api/chat", upstream.url())).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    assert_eq!(
        error_of(response).await,
        (500, "No response from API".to_string())
    );
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_url = format!("http://{}/api/chat", listener.local_addr().unwrap());
    drop(listener);
    let relay = spawn_relay(upstream_url.clone()).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    let (status, message) = error_of(response).await;

    assert_eq!(status, 500);
    assert!(message.starts_with("API Error: "), "{}", message);
    assert!(!message.contains(&upstream_url), "{}", message);
}

#[tokio::test]
async fn test_mid_stream_failure_ends_response_cleanly() {
    let upstream = Router::new().route(
        "/api/chat",
        post(|| async {
            let stream = async_stream::stream! {
                yield Ok(Bytes::from_static(b"partial"));
                tokio::time::sleep(Duration::from_millis(20)).await;
                yield Err(std::io::Error::new(std::io::ErrorKind::Other, "upstream died"));
            };
            Body::from_stream(stream)
        }),
    );
    let upstream = spawn(upstream).await;
    let relay = spawn_relay(format!("{}/api/chat", upstream)).await;

    let response = post_chat(&relay, r#"{"user_message": "hi"}"#).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "partial");
}

#[tokio::test]
async fn test_concurrent_relays_do_not_interleave() {
    let upstream = Router::new().route(
        "/api/chat",
        post(|Json(body): Json<Value>| async move {
            let word = body["user_message"].as_str().unwrap_or_default().to_string();
            let stream = async_stream::stream! {
                for i in 0..5 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    yield Ok::<_, std::io::Error>(Bytes::from(format!("{}-{};", word, i)));
                }
            };
            Body::from_stream(stream)
        }),
    );
    let upstream = spawn(upstream).await;
    let relay = spawn_relay(format!("{}/api/chat", upstream)).await;

    let (left, right) = tokio::join!(
        post_chat(&relay, r#"{"user_message": "alpha"}"#),
        post_chat(&relay, r#"{"user_message": "beta"}"#),
    );
    let (left, right) = tokio::join!(left.text(), right.text());

    assert_eq!(left.unwrap(), "alpha-0;alpha-1;alpha-2;alpha-3;alpha-4;");
    assert_eq!(right.unwrap(), "beta-0;beta-1;beta-2;beta-3;beta-4;");
}

#[tokio::test]
async fn test_health() {
    let relay = spawn_relay("http://127.0.0.1:9/api/chat".to_string()).await;

    let body: Value = reqwest::get(format!("{}/api/health", relay))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}
