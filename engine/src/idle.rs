//! Bounded wait for a stream to go idle.
//!
//! ```text
//! waiting ──status idle──> idle-detected ──┐
//!    │                                     ├──> resolved
//!    └────deadline────────> timed-out ─────┘
//! ```
//!
//! The poll ticker and the deadline belong to a single call and are dropped
//! together when either branch finishes. Concurrent waits share nothing.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

use threadline_types::is_idle;

use crate::status::StatusGetter;

/// One animation frame.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Upper bound on how long a navigation action waits for a stream to settle.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

/// How a wait ended. Every variant means "proceed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Idle on the first read; nothing was scheduled.
    AlreadyIdle,
    /// Became idle while polling.
    Idle,
    /// Still busy when the deadline passed.
    TimedOut,
}

impl IdleOutcome {
    #[must_use]
    pub const fn observed_idle(self) -> bool {
        matches!(self, IdleOutcome::AlreadyIdle | IdleOutcome::Idle)
    }
}

/// Poll `get_status` every [`IDLE_POLL_INTERVAL`] until idle or `limit` elapses.
pub async fn wait_for_idle(get_status: &StatusGetter, limit: Duration) -> IdleOutcome {
    if is_idle(get_status()) {
        return IdleOutcome::AlreadyIdle;
    }

    let poll = async {
        let mut ticker = interval_at(Instant::now() + IDLE_POLL_INTERVAL, IDLE_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if is_idle(get_status()) {
                return;
            }
        }
    };

    if timeout(limit, poll).await.is_ok() {
        IdleOutcome::Idle
    } else {
        tracing::debug!(
            limit_ms = limit.as_millis() as u64,
            status = ?get_status(),
            "Stream still busy at idle-wait deadline; proceeding"
        );
        IdleOutcome::TimedOut
    }
}

/// Wait for idleness without stopping anything. `None` uses [`DEFAULT_IDLE_TIMEOUT`].
pub async fn wait_for_chat_idle(get_status: &StatusGetter, limit: Option<Duration>) -> IdleOutcome {
    wait_for_idle(get_status, limit.unwrap_or(DEFAULT_IDLE_TIMEOUT)).await
}
