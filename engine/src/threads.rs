//! Navigation-affecting actions. Each one stops the active stream before it
//! touches selection or routing state.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use threadline_types::{NonEmptyString, ThreadId, ThreadSummary};

use crate::consumer::ThreadApi;
use crate::coordinator::{StopReport, StopRequest, stop_active_stream};
use crate::idle::DEFAULT_IDLE_TIMEOUT;
use crate::request::RequestGeneration;
use crate::session::ChatSession;
use crate::store::ThreadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Chat(ThreadId),
    Memories,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no thread with id {0}")]
    UnknownThread(ThreadId),
}

pub struct ThreadNavigator {
    session: ChatSession,
    store: Arc<dyn ThreadStore>,
    thread_api: Option<Arc<dyn ThreadApi>>,
    threads: Vec<ThreadSummary>,
    route: Route,
    idle_timeout: Duration,
}

impl std::fmt::Debug for ThreadNavigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadNavigator")
            .field("session", &self.session)
            .field("threads", &self.threads)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

impl ThreadNavigator {
    /// Navigator whose only thread is the session's current one.
    pub fn new(session: ChatSession, store: Arc<dyn ThreadStore>) -> Self {
        let current = session.thread_id();
        Self {
            session,
            store,
            thread_api: None,
            threads: vec![ThreadSummary::untitled(current)],
            route: Route::Chat(current),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_thread_api(mut self, api: Arc<dyn ThreadApi>) -> Self {
        self.thread_api = Some(api);
        self
    }

    /// List previously saved threads after the current one.
    #[must_use]
    pub fn with_saved_threads(mut self, ids: impl IntoIterator<Item = ThreadId>) -> Self {
        for id in ids {
            if !self.contains(id) {
                self.threads.push(ThreadSummary::untitled(id));
            }
        }
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = limit;
        self
    }

    #[must_use]
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    #[must_use]
    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    #[must_use]
    pub fn route(&self) -> Route {
        self.route
    }

    #[must_use]
    pub fn active_thread(&self) -> ThreadId {
        self.session.thread_id()
    }

    fn contains(&self, id: ThreadId) -> bool {
        self.threads.iter().any(|t| t.id == id)
    }

    fn stop_request(&self) -> StopRequest {
        let mut request = self.session.stop_request().with_idle_timeout(self.idle_timeout);
        // Remote cancellation only matters while a run may still be producing.
        if self.session.is_busy()
            && let Some(handle) = self
                .thread_api
                .as_ref()
                .and_then(|api| api.thread(self.session.thread_id()))
        {
            request = request.with_run_cancellation(handle);
        }
        request
    }

    /// Run the stop sequence for the active thread without navigating.
    pub async fn stop(&self) -> StopReport {
        stop_active_stream(self.stop_request()).await
    }

    /// Stop, then save the active transcript so a later switch finds it.
    pub async fn stop_and_save(&self) {
        self.stop().await;

        let id = self.active_thread();
        let messages = self.session.messages();
        if messages.is_empty() {
            return;
        }
        if let Err(e) = self.store.save_messages(id, &messages).await {
            tracing::warn!(%id, error = %e, "Failed to save thread before leaving");
        }
    }

    /// Send `text` on the active thread, opening its chat route.
    ///
    /// After the active thread was deleted the session holds an id that is
    /// not listed yet; it is listed here, once it gets its first message.
    pub fn send(&mut self, text: NonEmptyString) -> RequestGeneration {
        let id = self.active_thread();
        if !self.contains(id) {
            self.threads.insert(0, ThreadSummary::untitled(id));
        }
        self.route = Route::Chat(id);
        self.session.send(text)
    }

    pub async fn new_thread(&mut self) -> ThreadId {
        self.stop_and_save().await;

        let id = ThreadId::new();
        self.threads.insert(0, ThreadSummary::untitled(id));
        self.session.load_thread(id, Vec::new());
        self.route = Route::Chat(id);
        tracing::info!(%id, "Started new thread");
        id
    }

    pub async fn switch_thread(&mut self, id: ThreadId) -> Result<(), NavigationError> {
        if !self.contains(id) {
            return Err(NavigationError::UnknownThread(id));
        }
        self.stop_and_save().await;

        let messages = match self.store.load_messages(id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(%id, error = %e, "Failed to load thread; starting empty");
                Vec::new()
            }
        };
        self.session.load_thread(id, messages);
        self.route = Route::Chat(id);
        tracing::info!(%id, "Switched thread");
        Ok(())
    }

    /// Delete `id`. The stream is only stopped when `id` is the active thread.
    pub async fn delete_thread(&mut self, id: ThreadId) -> Result<(), NavigationError> {
        if !self.contains(id) {
            return Err(NavigationError::UnknownThread(id));
        }
        let active = id == self.active_thread();
        if active {
            self.stop().await;
        }

        self.threads.retain(|t| t.id != id);
        if let Err(e) = self.store.delete_thread(id).await {
            tracing::warn!(%id, error = %e, "Failed to delete thread");
        }

        if active {
            self.session.load_thread(ThreadId::new(), Vec::new());
            self.route = Route::Home;
        }
        tracing::info!(%id, active, "Deleted thread");
        Ok(())
    }

    pub async fn navigate_away(&mut self, route: Route) {
        self.stop_and_save().await;
        self.route = route;
    }
}
