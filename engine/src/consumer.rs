//! Seams between the coordinator and whatever consumes the stream.

use std::sync::Arc;

use threadline_types::{StreamStatus, ThreadId};

use crate::coordinator::HookFuture;

/// The client-side reader of a response stream.
pub trait StreamConsumer: Send + Sync {
    /// Current status, read live.
    fn status(&self) -> Option<StreamStatus>;

    /// Stop consuming. Must leave the consumer idle once the future resolves.
    fn stop(self: Arc<Self>) -> HookFuture;
}

/// Handle to a server-side run that may support cancellation.
pub trait RunCancellation: Send + Sync {
    /// `None` when this run has no cancel capability.
    fn cancel_run(&self) -> Option<HookFuture>;
}

/// Lookup for per-thread run handles.
pub trait ThreadApi: Send + Sync {
    fn thread(&self, id: ThreadId) -> Option<Arc<dyn RunCancellation>>;
}
