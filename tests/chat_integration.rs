use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use chatrelay::server::models::chat::Role;
use chatrelay::server::services::vector::VectorService;
use chatrelay::server::ws::types::{FrameKind, WsChatFrame};
use chatrelay::{app_router, AppConfig, AppState};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Boots the app against a mock upstream, bound to an ephemeral port.
/// Returns the bound address plus a state handle for inspecting the store.
async fn spawn_app(mock_uri: &str) -> (SocketAddr, AppState) {
    init_logging();

    let config = AppConfig {
        api_key: "test_key".to_string(),
        api_url: format!("{mock_uri}/v1"),
        port: 0,
        session_timeout: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(600),
    };
    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    let app = app_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn mount_completion(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "test_response",
            "object": "chat.completion",
            "model": "deepseek-chat",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": reply },
                "finish_reason": "stop"
            }]
        })))
        .mount(server)
        .await;
}

async fn next_frame(
    ws: &mut (impl futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
          + Unpin),
) -> WsChatFrame {
    let msg = ws
        .next()
        .await
        .expect("connection closed early")
        .expect("websocket read failed");
    serde_json::from_str(msg.to_text().unwrap()).expect("frame was not valid json")
}

#[tokio::test]
async fn sync_chat_appends_both_turns_and_replies() {
    let mock_server = MockServer::start().await;
    mount_completion(&mock_server, "Hello! How can I help you today?").await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "session_id": "", "message": "Hi" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Hello! How can I help you today?");
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("sess_"));

    let session = state.sessions.get(&session_id).await.unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[1].role, Role::Assistant);

    // A follow-up on the same session extends the transcript
    let response = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "session_id": session_id, "message": "More" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(state.sessions.count().await, 1);
    let session = state.sessions.get(&session_id).await.unwrap();
    assert_eq!(session.messages.len(), 4);
}

#[tokio::test]
async fn sync_chat_upstream_failure_maps_to_bad_gateway() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "Hi" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    // the user turn is kept, no assistant turn is persisted
    let sessions = state.sessions.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].messages.len(), 1);
    assert_eq!(sessions[0].messages[0].role, Role::User);
}

#[tokio::test]
async fn ws_streams_tokens_in_order_then_done() {
    let mock_server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
        "\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        "data: [DONE]\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/chat")).await.unwrap();
    ws.send(WsMessage::Text(
        json!({ "session_id": "", "message": "Hi" }).to_string(),
    ))
    .await
    .unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.kind, FrameKind::Token);
    assert_eq!(frame.content, "Hel");

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.kind, FrameKind::Token);
    assert_eq!(frame.content, "lo");

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.kind, FrameKind::Done);
    assert_eq!(frame.content, "");

    // the assembled reply is persisted as one assistant turn
    let sessions = state.sessions.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].messages.len(), 2);
    assert_eq!(sessions[0].messages[1].role, Role::Assistant);
    assert_eq!(sessions[0].messages[1].content, "Hello");
}

#[tokio::test]
async fn ws_upstream_failure_sends_single_error_frame() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/chat")).await.unwrap();
    ws.send(WsMessage::Text(
        json!({ "message": "Hi" }).to_string(),
    ))
    .await
    .unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.kind, FrameKind::Error);
    assert!(frame.content.contains("500"));

    // no token or done frame follows the error
    let extra = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(extra.is_err(), "unexpected frame after error: {extra:?}");

    // no assistant turn was appended to the aborted exchange
    let sessions = state.sessions.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].messages.len(), 1);
    assert_eq!(sessions[0].messages[0].role, Role::User);
}

#[tokio::test]
async fn ws_rejects_invalid_message_without_calling_upstream() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/chat")).await.unwrap();
    ws.send(WsMessage::Text(
        json!({ "message": "" }).to_string(),
    ))
    .await
    .unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.kind, FrameKind::Error);
    assert!(frame.content.contains("empty"));

    let sessions = state.sessions.list().await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].messages.is_empty());

    mock_server.verify().await;
}

#[tokio::test]
async fn ws_serves_consecutive_exchanges_on_one_connection() {
    let mock_server = MockServer::start().await;
    let sse_body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\ndata: [DONE]\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/chat")).await.unwrap();

    for _ in 0..2 {
        ws.send(WsMessage::Text(
            json!({ "message": "again" }).to_string(),
        ))
        .await
        .unwrap();
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame.kind, FrameKind::Token);
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame.kind, FrameKind::Done);
    }

    // an empty session_id starts a fresh session each exchange
    assert_eq!(state.sessions.count().await, 2);
}

#[tokio::test]
async fn health_reports_session_counts() {
    let mock_server = MockServer::start().await;
    mount_completion(&mock_server, "hi").await;
    let (addr, state) = spawn_app(&mock_server.uri()).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"]["total"], 0);

    state.sessions.create().await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["sessions"]["total"], 1);
    assert_eq!(body["sessions"]["active"], 1);
    assert_eq!(body["sessions"]["inactive"], 0);
    assert_eq!(body["sessions"]["max_age_seconds"], 3600);
}

#[tokio::test]
async fn embeddings_round_trip_through_mock_upstream() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }]
        })))
        .mount(&mock_server)
        .await;

    let service = VectorService::new("test_key".to_string(), format!("{}/v1", mock_server.uri()));
    let embedding = service.embed("hello").await.unwrap();
    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}
