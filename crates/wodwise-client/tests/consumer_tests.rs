use std::time::Duration;

use axum::{body::Body, routing::post, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;

use wodwise_client::{ChatRequest, Completion, StreamConsumer, StreamState};
use wodwise_config::UpstreamConfig;
use wodwise_core::Sentinel;
use wodwise_relay::{create_router, AppState, RelayService};

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Upstream that streams `chunks` with a pause before each one
async fn spawn_upstream(chunks: Vec<&'static str>) -> String {
    let router = Router::new().route(
        "/api/chat",
        post(move || {
            let chunks = chunks.clone();
            async move {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        yield Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()));
                    }
                };
                Body::from_stream(stream)
            }
        }),
    );
    spawn(router).await
}

async fn spawn_relay(upstream: &str) -> String {
    let config = UpstreamConfig {
        url: format!("{}/api/chat", upstream),
        ..UpstreamConfig::default()
    };
    let relay = RelayService::new(&config).unwrap();
    spawn(create_router(AppState::new(relay), false)).await
}

async fn consume_all(consumer: &StreamConsumer, request: ChatRequest) -> Vec<StreamState> {
    consumer.consume(request).collect().await
}

#[tokio::test]
async fn test_end_to_end_through_relay() {
    let upstream = spawn_upstream(vec!["Hi", " there", "\n\n__STREAM_COMPLETE__"]).await;
    let relay = spawn_relay(&upstream).await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay));

    let states = consume_all(&consumer, ChatRequest::new("hello").with_model("m1")).await;

    let (last, growth) = states.split_last().unwrap();
    assert_eq!(growth.len(), 2);
    assert_eq!(growth[0].accumulated_text, "Hi");
    assert_eq!(growth[1].accumulated_text, "Hi there");
    assert!(growth.iter().all(|state| !state.completed));

    assert_eq!(last.accumulated_text, "Hi there");
    assert!(last.completed);
    assert_eq!(last.completion, Some(Completion::Sentinel(Sentinel::Primary)));
    assert!(consumer.health_check().await);
}

#[tokio::test]
async fn test_transport_close_completes_without_sentinel() {
    let upstream = spawn_upstream(vec!["one ", "two"]).await;
    let relay = spawn_relay(&upstream).await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay));

    let last = consumer.consume_to_end(ChatRequest::new("hello")).await;

    assert!(last.completed);
    assert_eq!(last.accumulated_text, "one two");
    assert_eq!(last.completion, Some(Completion::EndOfStream));
}

#[tokio::test]
async fn test_legacy_sentinel_split_across_chunks() {
    let upstream = spawn_upstream(vec!["done soon\n", "\n[DO", "NE]"]).await;
    let relay = spawn_relay(&upstream).await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay));

    let last = consumer.consume_to_end(ChatRequest::new("hello")).await;

    assert_eq!(last.accumulated_text, "done soon");
    assert_eq!(last.completion, Some(Completion::Sentinel(Sentinel::Legacy)));
}

#[tokio::test]
async fn test_relay_error_becomes_terminal_message() {
    let mut relay = mockito::Server::new_async().await;
    relay
        .mock("POST", "/api/chat")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"rate limited"}"#)
        .create_async()
        .await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay.url()));

    let states = consume_all(&consumer, ChatRequest::new("hello")).await;

    assert_eq!(states.len(), 1);
    let state = &states[0];
    assert!(state.completed);
    assert!(state.accumulated_text.is_empty());
    assert_eq!(state.completion, Some(Completion::Failed));
    assert_eq!(state.message(), "Error: rate limited");
}

#[tokio::test]
async fn test_relay_non_json_error_uses_status_phrase() {
    let mut relay = mockito::Server::new_async().await;
    relay
        .mock("POST", "/api/chat")
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay.url()));

    let state = consumer.consume_to_end(ChatRequest::new("hello")).await;
    assert_eq!(state.message(), "Error: API Error: Bad Gateway");
}

#[tokio::test]
async fn test_unreachable_relay_clears_pending_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/api/chat", listener.local_addr().unwrap());
    drop(listener);
    let consumer = StreamConsumer::new(endpoint);

    let states = consume_all(&consumer, ChatRequest::new("hello")).await;

    assert_eq!(states.len(), 1);
    assert!(states[0].completed);
    assert!(states[0].message().starts_with("Error: "));
    assert!(!consumer.health_check().await);
}

#[tokio::test]
async fn test_consumer_defaults_are_sent() {
    let mut relay = mockito::Server::new_async().await;
    let mock = relay
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::Json(json!({
            "user_message": "hello",
            "developer_message": "You are a CrossFit coach.",
            "model": "gpt-4.1-mini"
        })))
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay.url()))
        .with_model("gpt-4.1-mini")
        .with_developer_message("You are a CrossFit coach.");

    let state = consumer.consume_to_end(ChatRequest::new("hello")).await;

    assert_eq!(state.accumulated_text, "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_turns_are_independent() {
    let upstream = spawn_upstream(vec!["same answer"]).await;
    let relay = spawn_relay(&upstream).await;
    let consumer = StreamConsumer::new(format!("{}/api/chat", relay));

    let first = consumer.consume_to_end(ChatRequest::new("hello")).await;
    let second = consumer.consume_to_end(ChatRequest::new("hello")).await;

    assert_eq!(first.accumulated_text, "same answer");
    assert_eq!(second.accumulated_text, "same answer");
}
