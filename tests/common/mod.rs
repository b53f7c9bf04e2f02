//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use threadline_engine::transport::{ChatRequest, ChatTransport, TransportFuture};
use threadline_engine::{
    ChatEndpoints, ChatSession, FileThreadStore, HttpThreadStore, StreamEvent, ThreadId,
};

/// Encode UI stream chunks as an SSE body.
pub fn sse_body(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body
}

/// Text deltas followed by `finish`.
pub fn reply_chunks(parts: &[&str]) -> Vec<serde_json::Value> {
    let mut chunks = vec![serde_json::json!({"type": "start"})];
    for part in parts {
        chunks.push(serde_json::json!({"type": "text-delta", "id": "0", "delta": part}));
    }
    chunks.push(serde_json::json!({"type": "finish"}));
    chunks
}

/// Mount a streaming reply on the default chat route.
pub async fn mount_reply(server: &MockServer, parts: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/ai"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body(&reply_chunks(parts)))
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Mount a chat route that does not answer for a long time.
pub async fn mount_stalled_reply(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ai"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body(&reply_chunks(&["too late"])))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(server)
        .await;
}

pub fn endpoints(server: &MockServer) -> ChatEndpoints {
    ChatEndpoints::new(server.uri()).expect("mock server URI is valid")
}

pub fn endpoints_with_cancel(server: &MockServer) -> ChatEndpoints {
    endpoints(server)
        .with_cancel_path("/api/chat/{id}/cancel")
        .expect("cancel path is valid")
}

/// Server-backed store keeping transcripts under `dir`.
pub fn http_store(endpoints: ChatEndpoints, dir: &Path) -> Arc<HttpThreadStore> {
    Arc::new(HttpThreadStore::new(endpoints, FileThreadStore::new(dir)))
}

/// Transport that emits one delta and then hangs, counting how many of its
/// streams are currently alive (started and not yet dropped).
#[derive(Debug, Default, Clone)]
pub struct CountingTransport {
    live: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl CountingTransport {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatTransport for CountingTransport {
    fn stream(&self, _request: ChatRequest, tx: mpsc::Sender<StreamEvent>) -> TransportFuture<'_> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            let _guard = LiveGuard(Arc::clone(&self.live));
            let _ = tx.send(StreamEvent::TextDelta("working".to_string())).await;
            std::future::pending::<()>().await;
            Ok(())
        })
    }
}

pub fn counting_session() -> (ChatSession, CountingTransport) {
    let transport = CountingTransport::default();
    let session = ChatSession::new(Arc::new(transport.clone()), ThreadId::new());
    (session, transport)
}
