//! Transport seam: how a chat request reaches the model.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use threadline_providers::{ChatEndpoints, stream_chat};
use threadline_types::{ChatMessage, StreamEvent, ThreadId};

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub thread_id: ThreadId,
    pub messages: Vec<ChatMessage>,
}

/// Streams one assistant response.
///
/// Implementations send events on `tx` until they send `Done` or `Error`, or
/// until `tx` is closed. Cancellation is by dropping the returned future.
pub trait ChatTransport: Send + Sync {
    fn stream(&self, request: ChatRequest, tx: mpsc::Sender<StreamEvent>) -> TransportFuture<'_>;
}

/// Transport backed by the HTTP chat route.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    endpoints: ChatEndpoints,
}

impl HttpChatTransport {
    #[must_use]
    pub fn new(endpoints: ChatEndpoints) -> Self {
        Self { endpoints }
    }

    #[must_use]
    pub fn endpoints(&self) -> &ChatEndpoints {
        &self.endpoints
    }
}

impl ChatTransport for HttpChatTransport {
    fn stream(&self, request: ChatRequest, tx: mpsc::Sender<StreamEvent>) -> TransportFuture<'_> {
        Box::pin(async move {
            stream_chat(&self.endpoints, request.thread_id, &request.messages, tx).await
        })
    }
}
