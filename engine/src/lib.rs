//! Chat stream lifecycle for Threadline.
//!
//! An in-flight assistant response must be fully stopped before the user
//! navigates, switches threads, deletes a thread or starts a new one. The
//! pieces:
//!
//! - [`status`]: the live status oracle ([`StatusGetter`], [`StatusCell`]).
//! - [`coordinator`]: [`stop_active_stream`], the ordered stop sequence.
//! - [`idle`]: [`wait_for_chat_idle`], the bounded idle wait.
//! - [`session`] and [`request`]: a chat session that owns at most one live
//!   request and implements [`StreamConsumer`].
//! - [`threads`]: navigation actions that stop the stream before acting.
//! - [`store`] and [`history`]: saved transcripts, one JSON file per thread.

pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod history;
pub mod idle;
pub mod request;
pub mod session;
pub mod status;
pub mod store;
pub mod threads;
pub mod transport;

pub use threadline_providers::{self, ChatEndpoints};
pub use threadline_types::{
    ChatMessage, NonEmptyString, Role, StreamEvent, StreamStatus, ThreadId, ThreadSummary, is_idle,
};

pub use config::{ConfigError, ThreadlineConfig};
pub use consumer::{RunCancellation, StreamConsumer, ThreadApi};
pub use coordinator::{
    HookFuture, StepOutcome, StopHook, StopReport, StopRequest, stop_active_stream, stop_hook,
};
pub use history::FileThreadStore;
pub use idle::{DEFAULT_IDLE_TIMEOUT, IDLE_POLL_INTERVAL, IdleOutcome, wait_for_chat_idle};
pub use request::{RequestGeneration, RequestSlot};
pub use session::ChatSession;
pub use status::{StatusCell, StatusGetter, status_getter, unknown_status};
pub use store::{HttpThreadApi, HttpThreadStore, ThreadStore};
pub use threads::{NavigationError, Route, ThreadNavigator};
pub use transport::{ChatRequest, ChatTransport, HttpChatTransport};
