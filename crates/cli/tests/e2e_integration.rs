//! End-to-end tests: the agent loop driving the real OpenAI-compatible
//! adapter against a local mock chat-completions server, plus the bridge
//! over its line transport.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use toolgate_agent::{AgentLoop, AgentStreamEvent, PlanStatus, Resolution, RunOutcome, RunRequest};
use toolgate_bridge::BridgeHandler;
use toolgate_config::RateLimitConfig;
use toolgate_core::{AgentMode, Credential, Role};
use toolgate_providers::OpenAiCompatProvider;
use toolgate_tools::{DryRunHandler, ToolExecutor, ToolRegistry};

// ── Mock chat-completions server ─────────────────────────────────────────

/// What the server answers to one request.
enum Reply {
    /// SSE frames followed by `[DONE]`.
    Frames(Vec<Value>),
    /// Headers, then silence.
    Stall,
    Status(StatusCode, Value),
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Value>>,
    /// Senders of stalled streams, kept open so the body never ends
    held: Mutex<Vec<mpsc::Sender<Result<String, Infallible>>>>,
}

async fn completions(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.requests.lock().unwrap().push(body);
    let reply = state.replies.lock().unwrap().pop_front();

    match reply {
        Some(Reply::Frames(frames)) => {
            let mut text = String::new();
            for frame in frames {
                text.push_str(&format!("data: {frame}\n\n"));
            }
            text.push_str("data: [DONE]\n\n");
            ([(header::CONTENT_TYPE, "text/event-stream")], text).into_response()
        }
        Some(Reply::Stall) => {
            let (tx, rx) = mpsc::channel(1);
            state.held.lock().unwrap().push(tx);
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(ReceiverStream::new(rx)),
            )
                .into_response()
        }
        Some(Reply::Status(status, body)) => (status, Json(body)).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no scripted reply").into_response(),
    }
}

async fn start_server(replies: Vec<Reply>) -> (String, Arc<MockState>) {
    let state = Arc::new(MockState {
        replies: Mutex::new(replies.into()),
        ..Default::default()
    });
    let app = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn content(text: &str) -> Value {
    json!({"choices": [{"delta": {"content": text}}]})
}

fn tool_fragment(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> Value {
    let mut function = json!({"arguments": args});
    if let Some(name) = name {
        function["name"] = json!(name);
    }
    let mut call = json!({"index": index, "function": function});
    if let Some(id) = id {
        call["id"] = json!(id);
    }
    json!({"choices": [{"delta": {"tool_calls": [call]}}]})
}

fn tool_call(index: u32, id: &str, name: &str, args: Value) -> Value {
    tool_fragment(index, Some(id), Some(name), &args.to_string())
}

fn agent(base_url: &str) -> AgentLoop {
    let provider = OpenAiCompatProvider::new("mock", base_url, "mock-model")
        .unwrap()
        .with_idle_timeout(Duration::from_millis(300));
    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    let limits = RateLimitConfig {
        min_call_delay_ms: 0,
        heavy_call_delay_ms: 0,
        ..RateLimitConfig::default()
    };
    let executor = ToolExecutor::new(registry, Arc::new(DryRunHandler), &limits);
    AgentLoop::new(Arc::new(provider), Credential::new("sk-test"), executor)
}

// ── Agent loop over HTTP ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_text_answer() {
    let (url, state) = start_server(vec![Reply::Frames(vec![
        content("You have "),
        content("3 unread chats."),
    ])])
    .await;

    let outcome = agent(&url)
        .run(RunRequest::new("How many unread chats?"), CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed { answer, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(answer.content, "You have 3 unread chats.");

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["stream"], true);
    assert_eq!(requests[0]["messages"][0]["role"], "system");
    assert!(requests[0]["tools"].as_array().unwrap().len() > 10);
}

#[tokio::test]
async fn e2e_split_arguments_are_reassembled_and_dispatched() {
    let (url, state) = start_server(vec![
        Reply::Frames(vec![
            tool_fragment(0, Some("call_1"), Some("sendMessage"), "{\"chat"),
            tool_fragment(0, None, None, "Id\":\"42\",\"te"),
            tool_fragment(0, None, None, "xt\":\"hi\"}"),
        ]),
        Reply::Frames(vec![content("Sent.")]),
    ])
    .await;

    let (mut rx, handle) = agent(&url).run_stream(RunRequest::new("say hi in 42"), CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let outcome = handle.await.unwrap().unwrap();

    let call = events
        .iter()
        .find_map(|e| match e {
            AgentStreamEvent::ToolCall { name, input, .. } => Some((name.clone(), input.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(call.0, "sendMessage");
    assert_eq!(call.1, json!({"chatId": "42", "text": "hi"}));
    assert!(matches!(events.last(), Some(AgentStreamEvent::Done { .. })));

    let RunOutcome::Completed { transcript, execution, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(execution.unwrap().affected_entity_ids, vec!["42"]);
    assert!(transcript.iter().any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("call_1")));

    // The second request replays the call and its result
    let requests = state.requests.lock().unwrap();
    let messages = requests[1]["messages"].as_array().unwrap();
    let assistant = &messages[messages.len() - 2];
    assert_eq!(assistant["tool_calls"][0]["function"]["name"], "sendMessage");
    assert_eq!(messages.last().unwrap()["role"], "tool");
}

#[tokio::test]
async fn e2e_destructive_batch_waits_for_approval() {
    let (url, state) = start_server(vec![Reply::Frames(vec![
        content("I'll delete chat 1 and pin chat 2."),
        tool_call(0, "call_a", "deleteChat", json!({"chatId": "1"})),
        tool_call(1, "call_b", "pinChat", json!({"chatId": "2"})),
    ])])
    .await;

    let agent = agent(&url);
    let outcome = agent
        .run(RunRequest::new("tidy up"), CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::AwaitingConfirmation { confirmation, .. } = outcome else {
        panic!("expected confirmation");
    };
    assert_eq!(confirmation.estimated_impact.steps_affected, 2);
    assert_eq!(confirmation.steps[0].tool, "deleteChat");
    assert_eq!(confirmation.steps[1].tool, "pinChat");

    let Resolution::Executed { execution, message } = agent.resume(&confirmation.plan_id, true).await.unwrap()
    else {
        panic!("expected execution");
    };
    assert_eq!(execution.plan.status, PlanStatus::Completed);
    assert_eq!(execution.affected_entity_ids, vec!["1", "2"]);
    assert!(execution.can_undo());
    assert_eq!(message.content, "Completed 2/2 actions. Affected 2 chat(s).");

    // Approval does not stream another turn
    assert_eq!(state.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn e2e_ask_mode_sends_read_only_tools() {
    let (url, state) = start_server(vec![Reply::Frames(vec![content("ok")])]).await;

    agent(&url)
        .with_mode(AgentMode::Ask)
        .run(RunRequest::new("what's new?"), CancellationToken::new())
        .await
        .unwrap();

    let requests = state.requests.lock().unwrap();
    let names: Vec<&str> = requests[0]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["function"]["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"listChats"));
    assert!(!names.contains(&"deleteChat"));
    assert!(!names.contains(&"sendMessage"));
    assert!(requests[0]["messages"][0]["content"].as_str().unwrap().contains("READ-ONLY"));
}

#[tokio::test]
async fn e2e_silent_stream_times_out() {
    let (url, _state) = start_server(vec![Reply::Stall]).await;

    let (mut rx, handle) = agent(&url).run_stream(RunRequest::new("hello"), CancellationToken::new());
    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    let err = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run should end on its own")
        .unwrap()
        .unwrap_err();

    assert!(err.is_timeout());
    match last {
        Some(AgentStreamEvent::Error { message }) => assert!(message.contains("timeout")),
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_cancel_during_stall_aborts() {
    let (url, _state) = start_server(vec![Reply::Stall]).await;
    let agent = agent(&url).with_thinking_idle(Duration::from_millis(50));

    let cancel = CancellationToken::new();
    let (mut rx, handle) = agent.run_stream(RunRequest::new("hello"), cancel.clone());
    // The first event is the thinking indicator turning on
    assert!(matches!(rx.recv().await, Some(AgentStreamEvent::Thinking { active: true, .. })));
    cancel.cancel();

    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.status(), "aborted");
    assert!(matches!(last, Some(AgentStreamEvent::Aborted { .. })));
}

#[tokio::test]
async fn e2e_auth_failure_is_reported() {
    let (url, _state) = start_server(vec![Reply::Status(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "bad key"}}),
    )])
    .await;

    let err = agent(&url)
        .run(RunRequest::new("hi"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid API key"));
}

#[tokio::test]
async fn e2e_stream_error_frame_is_fatal() {
    let (url, _state) = start_server(vec![Reply::Frames(vec![
        content("Working"),
        json!({"error": {"message": "Provider overloaded"}}),
    ])])
    .await;

    let err = agent(&url)
        .run(RunRequest::new("hi"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Provider overloaded"));
}

// ── Bridge ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_bridge_over_lines() {
    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    let executor = ToolExecutor::new(registry, Arc::new(DryRunHandler), &RateLimitConfig::default());
    let handler = BridgeHandler::new(executor);

    let input = [
        json!({"id": "1", "type": "list_tools"}),
        json!({"id": "2", "type": "list_skills"}),
        json!({"id": "3", "type": "execute", "tool": "getChatInfo", "args": {"chatId": "5"}}),
        json!({"id": "4", "type": "teleport"}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let mut out = Vec::new();
    toolgate_bridge::stdio::serve_lines(&handler, input.as_bytes(), &mut out, CancellationToken::new())
        .await
        .unwrap();
    let responses: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["type"], "tools");
    assert!(responses[0]["tools"].as_array().unwrap().iter().any(|t| t["name"] == "createDeal"));
    assert_eq!(responses[1]["type"], "skills");
    assert_eq!(responses[1]["data"][0]["name"], "crm");
    assert_eq!(responses[2]["id"], "3");
    assert_eq!(responses[2]["success"], true);
    assert_eq!(responses[3]["type"], "error");
    assert_eq!(responses[3]["error"], "Unknown request type: teleport");
}
