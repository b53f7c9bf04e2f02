//! Ordered, fault-isolated shutdown of an active chat stream.
//!
//! # Sequence
//!
//! ```text
//! transport cancel ─> consumer stop ─> remote run cancel ─> wait for idle
//! ```
//!
//! Each step runs to completion before the next starts, and each is isolated
//! on its own: an error or panic in one step is recorded in the
//! [`StopReport`] and the sequence moves on. [`stop_active_stream`] itself
//! never fails, so navigation that awaits it cannot be blocked by a backend
//! hiccup for longer than the idle-wait bound.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use crate::consumer::{RunCancellation, StreamConsumer};
use crate::idle::{DEFAULT_IDLE_TIMEOUT, IdleOutcome, wait_for_idle};
use crate::status::{StatusGetter, status_getter, unknown_status};

/// Future returned by a stop hook.
pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// One step of the stop sequence, invoked at most once.
pub type StopHook = Box<dyn FnOnce() -> HookFuture + Send + 'static>;

/// Box an async closure as a [`StopHook`].
pub fn stop_hook<F, Fut>(f: F) -> StopHook
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || -> HookFuture { Box::pin(f()) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStep {
    TransportCancel,
    ConsumerStop,
    RemoteCancel,
}

impl StopStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StopStep::TransportCancel => "transport_cancel",
            StopStep::ConsumerStop => "consumer_stop",
            StopStep::RemoteCancel => "remote_cancel",
        }
    }
}

impl fmt::Display for StopStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No hook supplied.
    Skipped,
    Completed,
    Failed(String),
    Panicked,
}

impl StepOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_) | StepOutcome::Panicked)
    }
}

/// What a stop call did. Informational only; every outcome means "proceed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub transport: StepOutcome,
    pub consumer: StepOutcome,
    pub remote: StepOutcome,
    pub idle: IdleOutcome,
}

impl StopReport {
    /// True when nothing was running and nothing needed stopping.
    #[must_use]
    pub fn was_noop(&self) -> bool {
        self.transport == StepOutcome::Skipped
            && self.consumer == StepOutcome::Skipped
            && self.remote == StepOutcome::Skipped
            && self.idle == IdleOutcome::AlreadyIdle
    }
}

/// Everything needed to bring one stream to rest. Built per action, consumed by
/// [`stop_active_stream`].
pub struct StopRequest {
    transport_cancel: Option<StopHook>,
    consumer_stop: Option<StopHook>,
    remote_cancel: Option<StopHook>,
    status: StatusGetter,
    idle_timeout: Duration,
}

impl fmt::Debug for StopRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopRequest")
            .field("transport_cancel", &self.transport_cancel.is_some())
            .field("consumer_stop", &self.consumer_stop.is_some())
            .field("remote_cancel", &self.remote_cancel.is_some())
            .field("status", &(self.status)())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl Default for StopRequest {
    fn default() -> Self {
        Self::new(unknown_status())
    }
}

impl StopRequest {
    #[must_use]
    pub fn new(status: StatusGetter) -> Self {
        Self {
            transport_cancel: None,
            consumer_stop: None,
            remote_cancel: None,
            status,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Request that stops `consumer` and reads its status live on every poll.
    pub fn for_consumer<C>(consumer: Arc<C>) -> Self
    where
        C: StreamConsumer + ?Sized + 'static,
    {
        let reader = Arc::clone(&consumer);
        Self::new(status_getter(move || reader.status()))
            .with_consumer_stop(move || consumer.stop())
    }

    pub fn with_transport_cancel<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transport_cancel = Some(stop_hook(f));
        self
    }

    pub fn with_consumer_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.consumer_stop = Some(stop_hook(f));
        self
    }

    pub fn with_remote_cancel<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.remote_cancel = Some(stop_hook(f));
        self
    }

    /// Remote step backed by a run handle. A handle without cancel support
    /// completes the step immediately.
    pub fn with_run_cancellation(self, handle: Arc<dyn RunCancellation>) -> Self {
        self.with_remote_cancel(move || async move {
            match handle.cancel_run() {
                Some(cancel) => cancel.await,
                None => Ok(()),
            }
        })
    }

    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = limit;
        self
    }

    #[must_use]
    pub fn status(&self) -> &StatusGetter {
        &self.status
    }
}

async fn run_step(step: StopStep, hook: Option<StopHook>) -> StepOutcome {
    let Some(hook) = hook else {
        return StepOutcome::Skipped;
    };

    tracing::trace!(%step, "Running stop step");

    // Invoking the hook inside the guarded future catches synchronous panics too.
    let guarded = AssertUnwindSafe(async move { hook().await }).catch_unwind();
    match guarded.await {
        Ok(Ok(())) => StepOutcome::Completed,
        Ok(Err(e)) => {
            if cfg!(debug_assertions) {
                tracing::debug!(%step, error = %e, "Stop step failed; continuing");
            }
            StepOutcome::Failed(e.to_string())
        }
        Err(_) => {
            if cfg!(debug_assertions) {
                tracing::debug!(%step, "Stop step panicked; continuing");
            }
            StepOutcome::Panicked
        }
    }
}

/// Bring the stream described by `request` to rest.
///
/// Runs transport cancel, consumer stop and remote cancel in that order, then
/// waits until the status getter reports idle or the request's idle timeout
/// passes. Never fails; with no hooks and an idle status it returns without
/// scheduling any timer.
pub async fn stop_active_stream(request: StopRequest) -> StopReport {
    let StopRequest {
        transport_cancel,
        consumer_stop,
        remote_cancel,
        status,
        idle_timeout,
    } = request;

    let transport = run_step(StopStep::TransportCancel, transport_cancel).await;
    let consumer = run_step(StopStep::ConsumerStop, consumer_stop).await;
    let remote = run_step(StopStep::RemoteCancel, remote_cancel).await;
    let idle = wait_for_idle(&status, idle_timeout).await;

    let report = StopReport {
        transport,
        consumer,
        remote,
        idle,
    };
    if !report.was_noop() {
        tracing::debug!(?report, "Active stream stopped");
    }
    report
}
