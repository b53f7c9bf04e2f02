//! The chat session: one transcript, one live request, one status cell.
//!
//! # Status transitions
//!
//! ```text
//! ready ──send──> submitted ──first delta──> streaming ──done──> ready
//!                     │                          │
//!                     └────────error─────────────┴──────────> error
//!
//! cancel_transport / stop: submitted | streaming ──> ready
//! ```
//!
//! Each request task publishes through [`RequestSlot::with_live`], so once a
//! request is aborted or superseded nothing it produces reaches the transcript
//! or the status cell. Lock order is slot, then transcript, then last error.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::Abortable;
use tokio::sync::mpsc;

use threadline_types::{ChatMessage, NonEmptyString, Role, StreamEvent, StreamStatus, ThreadId};

use crate::consumer::StreamConsumer;
use crate::coordinator::{HookFuture, StopRequest};
use crate::request::{RequestGeneration, RequestSlot};
use crate::status::{StatusCell, StatusGetter};
use crate::store::ThreadStore;
use crate::transport::{ChatRequest, ChatTransport};

const EVENT_CHANNEL_CAPACITY: usize = 64;

const INCOMPLETE_STREAM_ERROR: &str = "Stream ended before the response completed";

enum Ending {
    Completed,
    Failed(String),
}

enum Applied {
    Continue,
    /// The request was aborted or superseded.
    Stale,
    Ended(Ending),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionInner {
    transport: Arc<dyn ChatTransport>,
    status: StatusCell,
    slot: RequestSlot,
    thread: Mutex<ThreadId>,
    transcript: Mutex<Vec<ChatMessage>>,
    last_error: Mutex<Option<String>>,
    store: Option<Arc<dyn ThreadStore>>,
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("thread", &self.thread_id())
            .field("status", &self.status())
            .field("live_request", &self.inner.slot.is_live())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, thread: ThreadId) -> Self {
        Self::build(transport, thread, None)
    }

    /// Session that saves the transcript to `store` whenever a request ends.
    pub fn with_store(
        transport: Arc<dyn ChatTransport>,
        thread: ThreadId,
        store: Arc<dyn ThreadStore>,
    ) -> Self {
        Self::build(transport, thread, Some(store))
    }

    fn build(
        transport: Arc<dyn ChatTransport>,
        thread: ThreadId,
        store: Option<Arc<dyn ThreadStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                status: StatusCell::default(),
                slot: RequestSlot::new(),
                thread: Mutex::new(thread),
                transcript: Mutex::new(Vec::new()),
                last_error: Mutex::new(None),
                store,
            }),
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        *lock(&self.inner.thread)
    }

    #[must_use]
    pub fn status(&self) -> Option<StreamStatus> {
        self.inner.status.get()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.status.is_busy()
    }

    /// Live getter over this session's status.
    #[must_use]
    pub fn status_getter(&self) -> StatusGetter {
        self.inner.status.getter()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.inner.transcript).clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Append `text` as a user message and stream the reply.
    ///
    /// Any request still in flight is aborted first; its output is discarded.
    /// Must be called from within a Tokio runtime.
    pub fn send(&self, text: NonEmptyString) -> RequestGeneration {
        let inner = &self.inner;
        let mut request = None;
        let (generation, registration) = inner.slot.begin(|| {
            let mut transcript = lock(&inner.transcript);
            transcript.push(ChatMessage::user(text));
            request = Some(ChatRequest {
                thread_id: *lock(&inner.thread),
                messages: transcript.clone(),
            });
            *lock(&inner.last_error) = None;
            inner.status.set(StreamStatus::Submitted);
        });

        let Some(request) = request else {
            return generation;
        };

        tracing::debug!(
            generation = generation.get(),
            thread = %request.thread_id,
            "Chat request submitted"
        );

        let session = self.clone();
        tokio::spawn(async move {
            let run = Abortable::new(session.run_request(generation, request), registration);
            if run.await.is_err() {
                tracing::debug!(generation = generation.get(), "Chat request aborted");
            }
        });

        generation
    }

    async fn run_request(&self, generation: RequestGeneration, request: ChatRequest) {
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Arc::clone(&self.inner.transport);
        let mut stream = transport.stream(request, tx);
        let mut stream_result = None;
        let mut replying = false;

        let ending = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => match self.apply(generation, event, &mut replying) {
                        Applied::Continue => {}
                        Applied::Stale => return,
                        Applied::Ended(ending) => break ending,
                    },
                    // The transport dropped its sender; it has finished.
                    None => break match stream_result.take() {
                        Some(Err(e)) => Ending::Failed(format!("{e:#}")),
                        _ => Ending::Failed(INCOMPLETE_STREAM_ERROR.to_string()),
                    },
                },
                result = &mut stream, if stream_result.is_none() => {
                    stream_result = Some(result);
                }
            }
        };

        // A terminal event ends the exchange; a transport that keeps sending
        // sees a closed channel instead of blocking on a full one.
        drop(rx);
        drop(stream);
        self.settle(generation, ending).await;
    }

    /// Publish one event.
    fn apply(&self, generation: RequestGeneration, event: StreamEvent, replying: &mut bool) -> Applied {
        let inner = &self.inner;
        match event {
            StreamEvent::TextDelta(delta) => {
                let published = inner.slot.with_live(generation, || {
                    let mut transcript = lock(&inner.transcript);
                    match transcript.last_mut() {
                        Some(last) if *replying && last.role == Role::Assistant => {
                            last.content.push_str(&delta);
                        }
                        _ => transcript.push(ChatMessage::assistant(delta)),
                    }
                    *replying = true;
                    inner.status.set(StreamStatus::Streaming);
                });
                if published.is_some() {
                    Applied::Continue
                } else {
                    Applied::Stale
                }
            }
            StreamEvent::Done => Applied::Ended(Ending::Completed),
            StreamEvent::Error(message) => Applied::Ended(Ending::Failed(message)),
        }
    }

    /// Save the transcript, then publish the final status.
    ///
    /// The status stays busy until the save lands, so an idle wait that
    /// precedes a thread switch also waits for the write.
    async fn settle(&self, generation: RequestGeneration, ending: Ending) {
        let inner = &self.inner;
        if let Some(store) = &inner.store {
            let snapshot = inner.slot.with_live(generation, || {
                let thread = *lock(&inner.thread);
                (thread, lock(&inner.transcript).clone())
            });
            let Some((thread, messages)) = snapshot else {
                return;
            };
            if let Err(e) = store.save_messages(thread, &messages).await {
                tracing::warn!(%thread, error = %e, "Failed to save transcript");
            }
        }

        inner.slot.finish(generation, || match ending {
            Ending::Completed => {
                tracing::debug!(generation = generation.get(), "Chat request finished");
                inner.status.set(StreamStatus::Ready);
            }
            Ending::Failed(message) => {
                tracing::warn!(generation = generation.get(), error = %message, "Chat request failed");
                *lock(&inner.last_error) = Some(message);
                inner.status.set(StreamStatus::Error);
            }
        });
    }

    /// Abort the in-flight network request. Returns whether one was live.
    pub fn cancel_transport(&self) -> bool {
        let status = &self.inner.status;
        let aborted = self.inner.slot.abort(|| {
            status.settle(StreamStatus::Ready);
        });
        if aborted {
            tracing::debug!("Chat transport cancelled");
        }
        aborted
    }

    /// Stop consuming: abort anything still live and leave the session idle.
    pub fn halt(&self) {
        self.cancel_transport();
        self.inner.status.settle(StreamStatus::Ready);
    }

    /// Replace the transcript with another thread's messages.
    pub fn load_thread(&self, id: ThreadId, messages: Vec<ChatMessage>) {
        self.halt();
        *lock(&self.inner.thread) = id;
        *lock(&self.inner.transcript) = messages;
        *lock(&self.inner.last_error) = None;
        self.inner.status.set(StreamStatus::Ready);
    }

    /// Stop sequence for this session: transport cancel, then consumer stop,
    /// idle-waiting on the live status.
    #[must_use]
    pub fn stop_request(&self) -> StopRequest {
        let transport = self.clone();
        StopRequest::for_consumer(Arc::new(self.clone())).with_transport_cancel(
            move || async move {
                transport.cancel_transport();
                Ok(())
            },
        )
    }
}

impl StreamConsumer for ChatSession {
    fn status(&self) -> Option<StreamStatus> {
        ChatSession::status(self)
    }

    fn stop(self: Arc<Self>) -> HookFuture {
        Box::pin(async move {
            self.halt();
            Ok(())
        })
    }
}
