//! Stop sequence behavior through the public API, on a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, sleep};

use threadline_engine::{
    DEFAULT_IDLE_TIMEOUT, IDLE_POLL_INTERVAL, IdleOutcome, NonEmptyString, StatusCell, StepOutcome,
    StopRequest, StreamStatus, stop_active_stream, wait_for_chat_idle,
};

use crate::common::counting_session;

fn text(s: &str) -> NonEmptyString {
    NonEmptyString::new(s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn request_without_hooks_resolves_immediately() {
    let start = Instant::now();
    let report = stop_active_stream(StopRequest::default()).await;
    assert!(report.was_noop());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn resolves_near_flip_time_not_at_ceiling() {
    for flip_ms in [5_u64, 100, 750, 1900] {
        let cell = StatusCell::new(Some(StreamStatus::Streaming));
        let writer = cell.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(flip_ms)).await;
            writer.set(StreamStatus::Ready);
        });

        let start = Instant::now();
        let report = stop_active_stream(StopRequest::new(cell.getter())).await;

        let flip = Duration::from_millis(flip_ms);
        let elapsed = start.elapsed();
        assert_eq!(report.idle, IdleOutcome::Idle, "flip at {flip_ms}ms");
        assert!(elapsed >= flip, "flip at {flip_ms}ms resolved at {elapsed:?}");
        assert!(
            elapsed <= flip + IDLE_POLL_INTERVAL,
            "flip at {flip_ms}ms resolved at {elapsed:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn permanently_streaming_resolves_at_ceiling() {
    let cell = StatusCell::new(Some(StreamStatus::Streaming));
    let start = Instant::now();

    let report = stop_active_stream(StopRequest::new(cell.getter())).await;

    assert_eq!(report.idle, IdleOutcome::TimedOut);
    let elapsed = start.elapsed();
    assert!(elapsed >= DEFAULT_IDLE_TIMEOUT, "{elapsed:?}");
    assert!(elapsed < DEFAULT_IDLE_TIMEOUT + IDLE_POLL_INTERVAL, "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn failing_transport_cancel_still_stops_consumer() {
    let consumer_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&consumer_ran);

    let report = stop_active_stream(
        StopRequest::default()
            .with_transport_cancel(|| async { Err::<(), _>(anyhow::anyhow!("already aborted")) })
            .with_consumer_stop(move || async move {
                *flag.lock().unwrap() = true;
                Ok(())
            }),
    )
    .await;

    assert!(report.transport.is_failure());
    assert_eq!(report.consumer, StepOutcome::Completed);
    assert!(*consumer_ran.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn idle_wait_rereads_status_set_by_someone_else() {
    let cell = StatusCell::new(Some(StreamStatus::Submitted));
    let getter = cell.getter();
    let writer = cell.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        writer.set(StreamStatus::Error);
    });

    let start = Instant::now();
    let outcome = wait_for_chat_idle(&getter, None).await;

    assert_eq!(outcome, IdleOutcome::Idle);
    assert!(start.elapsed() <= IDLE_POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn rapid_sends_and_stops_never_overlap_requests() {
    let (session, transport) = counting_session();

    session.send(text("first"));
    sleep(Duration::from_millis(1)).await;
    session.send(text("second"));
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.started(), 2);
    assert_eq!(transport.live(), 1);

    let (a, b) = tokio::join!(
        stop_active_stream(session.stop_request()),
        stop_active_stream(session.stop_request()),
    );
    sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.live(), 0);
    assert!(a.idle.observed_idle());
    assert!(b.idle.observed_idle());
    assert_eq!(session.status(), Some(StreamStatus::Ready));
}

#[tokio::test(start_paused = true)]
async fn stop_then_send_starts_exactly_one_request() {
    let (session, transport) = counting_session();
    session.send(text("first"));
    sleep(Duration::from_millis(1)).await;

    stop_active_stream(session.stop_request()).await;
    session.send(text("again"));
    sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.live(), 1);
    assert_eq!(session.status(), Some(StreamStatus::Streaming));
}
