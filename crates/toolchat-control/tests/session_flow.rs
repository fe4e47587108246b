//! End-to-end turns against mock chat and tool endpoints.
//!
//! The chat endpoint is served by wiremock unless a test needs control over
//! how the body is split into reads, in which case a chunked in-process
//! model client is used instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use toolchat_control::{
    ByteStream, ChatConfig, ChatRequest, ChatSession, HttpModelClient, HttpToolExecutor,
    ModelClient, Phase, SessionEvent, TurnOutcome,
};
use toolchat_core::SessionId;
use toolchat_store::{MemoryStore, Role, TranscriptStore, MAX_PERSISTED_MESSAGES};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

fn data(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

fn content(text: &str) -> String {
    data(&json!({"choices": [{"delta": {"content": text}}]}))
}

fn text_body(text: &str) -> String {
    format!("{}data: [DONE]\n\n", content(text))
}

fn tool_call_body(method: &str, path: &str) -> String {
    let args = json!({"method": method, "path": path}).to_string();
    let delta = json!({"choices": [{"delta": {"tool_calls": [
        {"index": 0, "id": "call_1", "function": {"name": "api_request", "arguments": args}}
    ]}}]});
    let finish = json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]});
    format!("{}{}", data(&delta), data(&finish))
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn config(chat: &MockServer, tools: Option<&MockServer>, auto_execute: bool) -> ChatConfig {
    let mut config = ChatConfig {
        chat_url: format!("{}/llm-chat", chat.uri()),
        ..ChatConfig::default()
    };
    config.tools.enable_tools = true;
    config.tools.auto_execute = auto_execute;
    if let Some(tools) = tools {
        config.tools.base_url = tools.uri();
    }
    config
}

type HttpSession = ChatSession<MemoryStore, HttpModelClient, HttpToolExecutor>;

fn http_session(store: Arc<MemoryStore>, config: ChatConfig) -> HttpSession {
    let model = Arc::new(HttpModelClient::new(&config).unwrap());
    let tools = Arc::new(HttpToolExecutor::new(&config).unwrap());
    ChatSession::open(store, SessionId::generate(), model, tools, config, None).unwrap()
}

async fn chat_requests(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/llm-chat")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Model client that replays fixed reads, optionally never finishing.
struct ChunkedModel {
    chunks: Vec<Vec<u8>>,
    hang: bool,
}

impl ChunkedModel {
    fn new(chunks: &[&str], hang: bool) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            hang,
        }
    }
}

#[async_trait]
impl ModelClient for ChunkedModel {
    async fn open_stream(&self, _request: &ChatRequest) -> toolchat_control::Result<ByteStream> {
        let reads = stream::iter(self.chunks.clone().into_iter().map(Ok));
        if self.hang {
            Ok(reads.chain(stream::pending()).boxed())
        } else {
            Ok(reads.boxed())
        }
    }
}

fn chunked_session(
    store: Arc<MemoryStore>,
    model: ChunkedModel,
    events: Option<mpsc::Sender<SessionEvent>>,
) -> ChatSession<MemoryStore, ChunkedModel, HttpToolExecutor> {
    let config = ChatConfig::default();
    let tools = Arc::new(HttpToolExecutor::new(&config).unwrap());
    ChatSession::open(
        store,
        SessionId::generate(),
        Arc::new(model),
        tools,
        config,
        events,
    )
    .unwrap()
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn content_split_across_reads() {
    let hel = content("Hel");
    let lo = content("lo");
    // Cut the second event mid-line so neither read holds a complete payload.
    let (lo_a, lo_b) = lo.split_at(lo.len() / 2);
    let tail = format!("{lo_b}data: [DONE]\n");
    let model = ChunkedModel::new(&[hel.as_str(), lo_a, tail.as_str()], false);

    let mut session = chunked_session(Arc::new(MemoryStore::new()), model, None);
    let outcome = session.send_message("say hello").await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    let last = session.messages().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content.as_deref(), Some("Hello"));
}

#[tokio::test]
async fn content_over_http() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(sse(format!(
            "{}{}data: [DONE]\n\n",
            content("Hel"),
            content("lo")
        )))
        .mount(&chat)
        .await;

    let mut session = http_session(Arc::new(MemoryStore::new()), config(&chat, None, false));
    session.send_message("say hello").await.unwrap();
    assert_eq!(
        session.messages().last().unwrap().content.as_deref(),
        Some("Hello")
    );

    let requests = chat_requests(&chat).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["enable_tools"], true);
    assert_eq!(requests[0]["messages"][0]["content"], "say hello");
}

#[tokio::test]
async fn tool_call_split_across_reads() {
    let reads = [
        data(&json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1"}]}}]})),
        data(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"name": "api_request"}}
        ]}}]})),
        data(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "{\"method\":\"GET\","}}
        ]}}]})),
        data(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "\"path\":\"/items\"}"}}
        ]}}]})),
        data(&json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]})),
    ];
    let reads: Vec<&str> = reads.iter().map(String::as_str).collect();
    let model = ChunkedModel::new(&reads, false);

    let mut session = chunked_session(Arc::new(MemoryStore::new()), model, None);
    let outcome = session.send_message("list items").await.unwrap();

    let TurnOutcome::AwaitingConfirmation(pending) = outcome else {
        panic!("expected a pending tool call");
    };
    assert_eq!(pending.call_id, "call_1");
    assert_eq!(pending.method, "GET");
    assert_eq!(pending.path, "/items");
    assert_eq!(session.phase(), Phase::AwaitingExecution);
    assert_eq!(session.pending_tool_call(), Some(&pending));
}

#[tokio::test]
async fn model_endpoint_error_is_classified() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"bad key"}"#))
        .mount(&chat)
        .await;

    let mut session = http_session(Arc::new(MemoryStore::new()), config(&chat, None, false));
    let TurnOutcome::Failed(err) = session.send_message("hi").await.unwrap() else {
        panic!("expected failure");
    };
    assert_eq!(err.title, "Authentication Failed");
    assert_eq!(err.action(), Some("Check Settings"));

    let last = session.messages().last().unwrap();
    assert!(last.is_error);
    assert_eq!(session.phase(), Phase::Idle);
}

// =============================================================================
// Feedback loop
// =============================================================================

#[tokio::test]
async fn three_failures_stop_the_loop() {
    let chat = MockServer::start().await;
    let tools = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(sse(tool_call_body("GET", "/items/9")))
        .mount(&chat)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .expect(3)
        .mount(&tools)
        .await;

    let mut session = http_session(
        Arc::new(MemoryStore::new()),
        config(&chat, Some(&tools), true),
    );
    let outcome = session.send_message("fetch item 9").await.unwrap();

    assert_eq!(outcome, TurnOutcome::RetriesExhausted);
    assert_eq!(session.retry_count(), 3);
    assert_eq!(session.phase(), Phase::Idle);
    // One initial call plus one per accepted failure; none after the third.
    assert_eq!(chat_requests(&chat).await.len(), 3);

    let last = session.messages().last().unwrap();
    assert!(last.is_error);
    assert_eq!(
        last.content.as_deref(),
        Some(
            "Max tool call retries (3) reached. Last error: Status 404 Not Found\n\n```\nnot here\n```\n\nPlease try a different approach."
        )
    );
}

#[tokio::test]
async fn success_after_failure_resets_and_reinvokes() {
    let chat = MockServer::start().await;
    let tools = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(sse(tool_call_body("GET", "/items")))
        .up_to_n_times(2)
        .mount(&chat)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(sse(text_body("There are two items.")))
        .mount(&chat)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&tools)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1,2]"))
        .mount(&tools)
        .await;

    let mut session = http_session(
        Arc::new(MemoryStore::new()),
        config(&chat, Some(&tools), false),
    );

    let outcome = session.send_message("list items").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::AwaitingConfirmation(_)));

    let outcome = session.execute_pending().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::AwaitingConfirmation(_)));
    assert_eq!(session.retry_count(), 1);

    let outcome = session.execute_pending().await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.retry_count(), 0);

    let requests = chat_requests(&chat).await;
    assert_eq!(requests.len(), 3);
    let messages = requests[2]["messages"].as_array().unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["tool_call_id"], "call_1");
    assert_eq!(last["content"], "Status: 200 OK\n\n[1,2]");
    let call = &messages[messages.len() - 2];
    assert_eq!(call["role"], "assistant");
    assert!(call["content"].is_null());
    assert_eq!(call["tool_calls"][0]["function"]["name"], "api_request");

    assert_eq!(
        session.messages().last().unwrap().content.as_deref(),
        Some("There are two items.")
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancel_keeps_partial_content() {
    let store = Arc::new(MemoryStore::new());
    let (tx, mut rx) = mpsc::channel(16);
    let partial = content("Thinking about...");
    let model = ChunkedModel::new(&[partial.as_str()], true);
    let mut session = chunked_session(Arc::clone(&store), model, Some(tx));

    let canceller = session.canceller();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if matches!(event, SessionEvent::ContentDelta(_)) {
                canceller.cancel();
            }
        }
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), session.send_message("think"))
        .await
        .expect("cancel did not end the turn")
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert_eq!(session.phase(), Phase::Idle);

    let persisted = store.load_transcript(session.session_id()).unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[1].content.as_deref(), Some("Thinking about..."));
    assert!(persisted.iter().all(|m| !m.is_error));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn streamed_content_is_stored_before_the_turn_ends() {
    let store = Arc::new(MemoryStore::new());
    let (tx, mut rx) = mpsc::channel(16);
    let first = content("Hello, ");
    let second = content("world");
    let model = ChunkedModel::new(&[first.as_str(), second.as_str()], true);
    let mut session = chunked_session(Arc::clone(&store), model, Some(tx));
    let session_id = *session.session_id();

    // Snapshot the store on every delta, then cancel once both arrived.
    let canceller = session.canceller();
    let reader = Arc::clone(&store);
    let snapshots = tokio::spawn(async move {
        let mut stored = Vec::new();
        while let Some(event) = rx.recv().await {
            if matches!(event, SessionEvent::ContentDelta(_)) {
                let messages = reader.load_transcript(&session_id).unwrap();
                stored.push(messages.last().and_then(|m| m.content.clone()));
                if stored.len() == 2 {
                    canceller.cancel();
                }
            }
        }
        stored
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), session.send_message("greet"))
        .await
        .expect("cancel did not end the turn")
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Cancelled);
    drop(session);

    let stored = snapshots.await.unwrap();
    assert_eq!(
        stored,
        vec![Some("Hello, ".to_string()), Some("Hello, world".to_string())]
    );
}

#[tokio::test]
async fn persisted_window_keeps_last_twenty() {
    let chat = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm-chat"))
        .respond_with(sse(text_body("ack")))
        .mount(&chat)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut session = http_session(Arc::clone(&store), config(&chat, None, false));
    for i in 0..13 {
        session.send_message(&format!("message {i}")).await.unwrap();
    }

    assert_eq!(session.messages().len(), 26);
    let persisted = store.load_transcript(session.session_id()).unwrap();
    assert_eq!(persisted.len(), MAX_PERSISTED_MESSAGES);
    assert_eq!(persisted.as_slice(), &session.messages()[6..]);
    assert_eq!(persisted[0].content.as_deref(), Some("message 3"));
}
