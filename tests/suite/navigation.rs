//! Thread actions stop the stream before changing selection.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

use threadline_engine::{
    NavigationError, NonEmptyString, Route, StreamStatus, ThreadId, ThreadNavigator,
};

use crate::common::{CountingTransport, counting_session, http_store};

fn navigator() -> (ThreadNavigator, CountingTransport, TempDir) {
    let (session, transport) = counting_session();
    let history = tempfile::tempdir().unwrap();
    // Port 9 (discard) refuses connections; server deletes fail and are logged.
    let endpoints = threadline_engine::ChatEndpoints::new("http://127.0.0.1:9").unwrap();
    let nav = ThreadNavigator::new(session, http_store(endpoints, history.path()))
        .with_idle_timeout(Duration::from_millis(500));
    (nav, transport, history)
}

async fn start_stream(nav: &ThreadNavigator) {
    nav.session().send(NonEmptyString::new("hello").unwrap());
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn every_action_leaves_no_live_request() {
    let (mut nav, transport, _history) = navigator();

    start_stream(&nav).await;
    let second = nav.new_thread().await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.live(), 0);

    start_stream(&nav).await;
    let first = nav.threads()[1].id;
    nav.switch_thread(first).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.live(), 0);
    assert_eq!(nav.active_thread(), first);

    start_stream(&nav).await;
    nav.navigate_away(Route::Memories).await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.live(), 0);
    assert_eq!(nav.route(), Route::Memories);

    nav.switch_thread(second).await.unwrap();
    start_stream(&nav).await;
    nav.delete_thread(second).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.live(), 0);
    assert_eq!(nav.route(), Route::Home);
    assert_eq!(nav.session().status(), Some(StreamStatus::Ready));
}

#[tokio::test(start_paused = true)]
async fn unknown_thread_is_rejected() {
    let (mut nav, _transport, _history) = navigator();
    let missing = ThreadId::new();
    assert_eq!(
        nav.delete_thread(missing).await,
        Err(NavigationError::UnknownThread(missing))
    );
    assert_eq!(
        nav.switch_thread(missing).await,
        Err(NavigationError::UnknownThread(missing))
    );
}

#[tokio::test(start_paused = true)]
async fn stale_stream_output_never_reaches_new_thread() {
    let (mut nav, _transport, _history) = navigator();
    start_stream(&nav).await;
    assert_eq!(nav.session().messages().len(), 2);

    nav.new_thread().await;
    sleep(Duration::from_millis(50)).await;

    assert!(nav.session().messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_message_after_deleting_active_thread_is_listed() {
    let (mut nav, transport, _history) = navigator();
    let deleted = nav.active_thread();
    nav.delete_thread(deleted).await.unwrap();
    assert_eq!(nav.route(), Route::Home);

    nav.send(NonEmptyString::new("start over").unwrap());
    sleep(Duration::from_millis(1)).await;

    let active = nav.active_thread();
    assert!(nav.threads().iter().any(|t| t.id == active));
    assert_eq!(nav.route(), Route::Chat(active));
    assert_eq!(transport.live(), 1);

    nav.delete_thread(active).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn partial_reply_survives_switching_away_and_back() {
    let (mut nav, _transport, history) = navigator();
    let first = nav.active_thread();
    start_stream(&nav).await;

    nav.new_thread().await;
    nav.switch_thread(first).await.unwrap();

    assert_eq!(nav.session().messages().len(), 2);
    assert!(history.path().join(format!("{first}.json")).exists());
}
