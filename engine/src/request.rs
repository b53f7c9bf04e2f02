//! Ownership of the one in-flight chat request.
//!
//! Every request is tagged with a [`RequestGeneration`]. A stream task may
//! only publish while its generation is still live, so output from an aborted
//! or superseded request is dropped instead of landing on the next thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{AbortHandle, AbortRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestGeneration(u64);

impl RequestGeneration {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct LiveRequest {
    generation: RequestGeneration,
    abort: AbortHandle,
}

#[derive(Debug, Default)]
struct SlotState {
    next: u64,
    live: Option<LiveRequest>,
}

/// Shared slot holding the abort handle of the live request, if any.
#[derive(Debug, Clone, Default)]
pub struct RequestSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl RequestSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // State is a handle plus a counter; a panicked writer cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new request, aborting any previous one.
    ///
    /// `on_start` runs under the slot lock after the new generation is live.
    pub fn begin(&self, on_start: impl FnOnce()) -> (RequestGeneration, AbortRegistration) {
        let (abort, registration) = AbortHandle::new_pair();
        let mut state = self.lock();
        if let Some(previous) = state.live.take() {
            tracing::debug!(generation = previous.generation.0, "Superseding live request");
            previous.abort.abort();
        }
        state.next += 1;
        let generation = RequestGeneration(state.next);
        state.live = Some(LiveRequest { generation, abort });
        on_start();
        (generation, registration)
    }

    /// Abort the live request. `on_abort` runs under the slot lock only when
    /// something was aborted. Returns whether a request was live.
    pub fn abort(&self, on_abort: impl FnOnce()) -> bool {
        let mut state = self.lock();
        let Some(live) = state.live.take() else {
            return false;
        };
        live.abort.abort();
        on_abort();
        true
    }

    /// Run `f` under the slot lock if `generation` is still live.
    pub fn with_live<R>(&self, generation: RequestGeneration, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.lock();
        match &state.live {
            Some(live) if live.generation == generation => Some(f()),
            _ => None,
        }
    }

    /// Retire `generation`, running `f` first if it was still live.
    pub fn finish(&self, generation: RequestGeneration, f: impl FnOnce()) -> bool {
        let mut state = self.lock();
        match &state.live {
            Some(live) if live.generation == generation => {
                f();
                state.live = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.lock().live.is_some()
    }
}
