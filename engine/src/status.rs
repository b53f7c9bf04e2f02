//! Live stream status: the single source of truth for "is a response in flight".
//!
//! Status is never handed out by value. Readers receive a [`StatusGetter`] and
//! call it at the moment they need an answer, so a getter created before a
//! thread switch still reports the status after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use threadline_types::StreamStatus;

/// Live accessor for the current stream status. `None` means unknown (idle).
pub type StatusGetter = Arc<dyn Fn() -> Option<StreamStatus> + Send + Sync>;

/// Wrap a closure as a [`StatusGetter`].
pub fn status_getter<F>(f: F) -> StatusGetter
where
    F: Fn() -> Option<StreamStatus> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Getter for callers with no stream at all.
#[must_use]
pub fn unknown_status() -> StatusGetter {
    status_getter(|| None)
}

const UNKNOWN: u8 = 0;

const fn encode(status: Option<StreamStatus>) -> u8 {
    match status {
        None => UNKNOWN,
        Some(StreamStatus::Ready) => 1,
        Some(StreamStatus::Submitted) => 2,
        Some(StreamStatus::Streaming) => 3,
        Some(StreamStatus::Error) => 4,
    }
}

const fn decode(raw: u8) -> Option<StreamStatus> {
    match raw {
        1 => Some(StreamStatus::Ready),
        2 => Some(StreamStatus::Submitted),
        3 => Some(StreamStatus::Streaming),
        4 => Some(StreamStatus::Error),
        _ => None,
    }
}

/// Shared, lock-free status cell written by the stream consumer.
///
/// Clones share the same cell.
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<AtomicU8>);

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(Some(StreamStatus::Ready))
    }
}

impl StatusCell {
    #[must_use]
    pub fn new(initial: Option<StreamStatus>) -> Self {
        Self(Arc::new(AtomicU8::new(encode(initial))))
    }

    #[must_use]
    pub fn get(&self) -> Option<StreamStatus> {
        decode(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: StreamStatus) {
        self.0.store(encode(Some(status)), Ordering::Release);
    }

    /// Move a busy status to `to`; idle statuses are left alone.
    /// Returns whether the cell changed.
    pub fn settle(&self, to: StreamStatus) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if !decode(current).is_some_and(StreamStatus::is_busy) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                encode(Some(to)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.get().is_some_and(StreamStatus::is_busy)
    }

    /// Getter that re-reads this cell on every call.
    #[must_use]
    pub fn getter(&self) -> StatusGetter {
        let cell = Arc::clone(&self.0);
        status_getter(move || decode(cell.load(Ordering::Acquire)))
    }
}
