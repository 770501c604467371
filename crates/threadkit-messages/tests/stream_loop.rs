//! End-to-end Messages streaming against a canned SSE server: one
//! tool-use turn, tool dispatch, then the final text turn.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing;
use threadkit::{BlockKind, ProviderConfig, Session, Thread};
use threadkit_messages::MessagesAdapter;

struct ServerState {
    turns: Vec<String>,
    bodies: Mutex<Vec<serde_json::Value>>,
    hits: AtomicUsize,
}

async fn start_server(turns: Vec<String>) -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState {
        turns,
        bodies: Mutex::new(Vec::new()),
        hits: AtomicUsize::new(0),
    });

    async fn handle(State(state): State<Arc<ServerState>>, body: Bytes) -> impl IntoResponse {
        state
            .bodies
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&body).unwrap());
        let n = state.hits.fetch_add(1, Ordering::SeqCst);
        let turn = state.turns[n.min(state.turns.len() - 1)].clone();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/event-stream".parse().unwrap());
        (headers, turn)
    }

    let app = Router::new()
        .route("/v1/messages", routing::post(handle))
        .with_state(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, state)
}

fn sse(payloads: &[&str]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str("data: ");
        body.push_str(payload);
        body.push_str("\n\n");
    }
    body
}

fn local_adapter(addr: SocketAddr) -> MessagesAdapter {
    MessagesAdapter::new(ProviderConfig {
        name: "anthropic".into(),
        endpoint: format!("http://{addr}/v1/messages"),
        api_key: "sk-ant-test".into(),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_tool_use_turn_then_final_text() {
    let first_turn = sse(&[
        r#"{"type":"message_start","message":{"id":"msg_01","usage":{"input_tokens":40,"output_tokens":0}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_01","name":"get_weather","input":{}}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"location\":"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":" \"Paris\"}"}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":12}}"#,
        r#"{"type":"message_stop"}"#,
    ]);
    let second_turn = sse(&[
        r#"{"type":"message_start","message":{"id":"msg_02","usage":{"input_tokens":55,"output_tokens":0}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"It is sunny"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" in Paris."}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":8}}"#,
        r#"{"type":"message_stop"}"#,
    ]);
    let (addr, server) = start_server(vec![first_turn, second_turn]).await;

    let mut thread = Thread::new();
    thread.model = "claude-sonnet-4-20250514".into();
    thread.input("Weather in Paris?");
    thread.set_tool_handler(|name, args| {
        assert_eq!(name, "get_weather");
        assert_eq!(args, r#"{"location": "Paris"}"#);
        "sunny, 21C".to_string()
    });

    let mut session = Session::new(local_adapter(addr), thread);
    let mut partials = 0;
    let thread = session.stream(|_| partials += 1).await;

    assert!(thread.success, "error: {:?}", thread.error);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert_eq!(thread.thread_id, "msg_01");
    assert_eq!(thread.usage.output_tokens, 20);
    assert_eq!(thread.usage.input_tokens, 95);
    assert!(partials >= 3, "partials: {partials}");

    let call_block = thread
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::ToolCall)
        .unwrap();
    assert!(call_block.complete);
    assert_eq!(
        call_block.tool_result.as_ref().unwrap().output,
        "sunny, 21C"
    );
    let text_block = thread
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::Text)
        .unwrap();
    assert_eq!(text_block.text, "It is sunny in Paris.");
    assert!(text_block.complete);

    // The second request replays the call and carries the result.
    let bodies = server.bodies.lock().unwrap();
    let messages = bodies[1]["messages"].as_array().unwrap();
    let roles: Vec<_> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(messages[1]["content"][0]["type"], "tool_use");
    assert_eq!(messages[1]["content"][0]["input"]["location"], "Paris");
    assert_eq!(messages[2]["content"][0]["type"], "tool_result");
    assert_eq!(messages[2]["content"][0]["content"], "sunny, 21C");
}

#[tokio::test]
async fn test_http_error_surfaces_typed() {
    async fn handle() -> impl IntoResponse {
        (
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"type":"rate_limit_error","message":"Too many requests"}}"#,
        )
    }
    let app = Router::new().route("/v1/messages", routing::post(handle));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let mut session = Session::new(local_adapter(addr), Thread::new());
    let thread = session.stream(|_| {}).await;

    assert!(!thread.success);
    assert_eq!(
        thread.error.as_deref(),
        Some("[messages.anthropic] rate_limit: Too many requests")
    );
}
