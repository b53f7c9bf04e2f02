//! Thread persistence and server-side run control.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use threadline_providers::{ChatEndpoints, cancel_run, delete_thread};
use threadline_types::{ChatMessage, ThreadId};

use crate::consumer::{RunCancellation, ThreadApi};
use crate::coordinator::HookFuture;
use crate::history::FileThreadStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait ThreadStore: Send + Sync {
    /// Saved transcript for `id`; empty for a thread the store has never seen.
    fn load_messages(&self, id: ThreadId) -> StoreFuture<'_, Vec<ChatMessage>>;

    /// Replace the saved transcript for `id`.
    fn save_messages(&self, id: ThreadId, messages: &[ChatMessage]) -> StoreFuture<'_, ()>;

    fn delete_thread(&self, id: ThreadId) -> StoreFuture<'_, ()>;
}

/// Transcripts kept in local history; deletes also go to the server's
/// delete route.
#[derive(Debug, Clone)]
pub struct HttpThreadStore {
    endpoints: ChatEndpoints,
    history: FileThreadStore,
}

impl HttpThreadStore {
    #[must_use]
    pub fn new(endpoints: ChatEndpoints, history: FileThreadStore) -> Self {
        Self { endpoints, history }
    }

    #[must_use]
    pub fn history(&self) -> &FileThreadStore {
        &self.history
    }
}

impl ThreadStore for HttpThreadStore {
    fn load_messages(&self, id: ThreadId) -> StoreFuture<'_, Vec<ChatMessage>> {
        self.history.load_messages(id)
    }

    fn save_messages(&self, id: ThreadId, messages: &[ChatMessage]) -> StoreFuture<'_, ()> {
        self.history.save_messages(id, messages)
    }

    /// Removes the local transcript even when the server delete fails.
    fn delete_thread(&self, id: ThreadId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let local = self.history.delete_thread(id).await;
            let remote = delete_thread(&self.endpoints, id).await;
            local.and(remote)
        })
    }
}

/// Run handles for the HTTP server. Only available when a cancel route is configured.
#[derive(Debug, Clone)]
pub struct HttpThreadApi {
    endpoints: Arc<ChatEndpoints>,
}

impl HttpThreadApi {
    #[must_use]
    pub fn new(endpoints: ChatEndpoints) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
        }
    }
}

impl ThreadApi for HttpThreadApi {
    fn thread(&self, id: ThreadId) -> Option<Arc<dyn RunCancellation>> {
        let handle = HttpRunHandle {
            endpoints: Arc::clone(&self.endpoints),
            id,
        };
        Some(Arc::new(handle))
    }
}

#[derive(Debug)]
pub struct HttpRunHandle {
    endpoints: Arc<ChatEndpoints>,
    id: ThreadId,
}

impl RunCancellation for HttpRunHandle {
    fn cancel_run(&self) -> Option<HookFuture> {
        if !self.endpoints.supports_run_cancellation() {
            return None;
        }
        let endpoints = Arc::clone(&self.endpoints);
        let id = self.id;
        Some(Box::pin(async move {
            let cancelled = cancel_run(&endpoints, id).await?;
            tracing::debug!(%id, cancelled, "Remote run cancel sent");
            Ok(())
        }))
    }
}
