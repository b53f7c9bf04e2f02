//! Engine against a mock chat server over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use threadline_engine::{
    ChatMessage, ChatSession, FileThreadStore, HttpChatTransport, HttpThreadApi, IdleOutcome,
    NonEmptyString, Route, StepOutcome, StreamStatus, ThreadId, ThreadNavigator, ThreadStore,
    stop_active_stream, wait_for_chat_idle,
};

use crate::common::{endpoints, endpoints_with_cancel, http_store, mount_reply, mount_stalled_reply};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

struct Harness {
    nav: ThreadNavigator,
    history: TempDir,
}

impl std::ops::Deref for Harness {
    type Target = ThreadNavigator;

    fn deref(&self) -> &ThreadNavigator {
        &self.nav
    }
}

impl std::ops::DerefMut for Harness {
    fn deref_mut(&mut self) -> &mut ThreadNavigator {
        &mut self.nav
    }
}

fn http_navigator(endpoints: threadline_engine::ChatEndpoints) -> Harness {
    let history = tempfile::tempdir().unwrap();
    let store = http_store(endpoints.clone(), history.path());
    let session = ChatSession::with_store(
        Arc::new(HttpChatTransport::new(endpoints.clone())),
        ThreadId::new(),
        store.clone(),
    );
    let mut nav = ThreadNavigator::new(session, store);
    if endpoints.supports_run_cancellation() {
        nav = nav.with_thread_api(Arc::new(HttpThreadApi::new(endpoints)));
    }
    Harness { nav, history }
}

#[tokio::test]
async fn reply_streams_into_transcript() {
    let server = MockServer::start().await;
    mount_reply(&server, &["Hello", ", ", "world"]).await;

    let nav = http_navigator(endpoints(&server));
    nav.session().send(NonEmptyString::new("hi").unwrap());

    let outcome = wait_for_chat_idle(&nav.session().status_getter(), WAIT).await;

    assert!(outcome.observed_idle());
    assert_eq!(nav.session().status(), Some(StreamStatus::Ready));
    assert_eq!(
        nav.session().messages().last(),
        Some(&ChatMessage::assistant("Hello, world"))
    );
}

#[tokio::test]
async fn server_error_surfaces_as_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ai"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let nav = http_navigator(endpoints(&server));
    nav.session().send(NonEmptyString::new("hi").unwrap());
    wait_for_chat_idle(&nav.session().status_getter(), WAIT).await;

    assert_eq!(nav.session().status(), Some(StreamStatus::Error));
    let error = nav.session().last_error().unwrap();
    assert!(error.contains("500") && error.contains("model overloaded"), "{error}");
}

#[tokio::test]
async fn navigating_away_cancels_transport_and_remote_run() {
    let server = MockServer::start().await;
    mount_stalled_reply(&server).await;

    let mut nav = http_navigator(endpoints_with_cancel(&server));
    let thread = nav.active_thread();
    Mock::given(method("POST"))
        .and(path(format!("/api/chat/{thread}/cancel")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    nav.session().send(NonEmptyString::new("hi").unwrap());
    assert!(nav.session().is_busy());

    let started = std::time::Instant::now();
    nav.navigate_away(Route::Home).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(nav.route(), Route::Home);
    assert!(!nav.session().is_busy());
    server.verify().await;
}

#[tokio::test]
async fn failed_remote_cancel_does_not_block_stop() {
    let server = MockServer::start().await;
    mount_stalled_reply(&server).await;

    let nav = http_navigator(endpoints_with_cancel(&server));
    let thread = nav.active_thread();
    Mock::given(method("POST"))
        .and(path(format!("/api/chat/{thread}/cancel")))
        .respond_with(ResponseTemplate::new(409).set_body_string("run already finished"))
        .mount(&server)
        .await;

    nav.session().send(NonEmptyString::new("hi").unwrap());
    let report = nav.stop().await;

    assert_eq!(report.transport, StepOutcome::Completed);
    assert!(matches!(report.remote, StepOutcome::Failed(ref e) if e.contains("409")));
    assert_eq!(report.idle, IdleOutcome::AlreadyIdle);
}

#[tokio::test]
async fn deleting_thread_posts_to_delete_route() {
    let server = MockServer::start().await;
    let mut nav = http_navigator(endpoints(&server));
    let thread = nav.active_thread();
    Mock::given(method("POST"))
        .and(path(format!("/api/chat/delete/{thread}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    nav.delete_thread(thread).await.unwrap();

    assert_eq!(nav.route(), Route::Home);
    assert!(nav.threads().is_empty());
    server.verify().await;
}

#[tokio::test]
async fn session_stop_request_alone_stops_http_stream() {
    let server = MockServer::start().await;
    mount_stalled_reply(&server).await;

    let session = ChatSession::new(
        Arc::new(HttpChatTransport::new(endpoints(&server))),
        ThreadId::new(),
    );
    session.send(NonEmptyString::new("hi").unwrap());

    let report = stop_active_stream(session.stop_request()).await;

    assert_eq!(report.idle, IdleOutcome::AlreadyIdle);
    assert_eq!(session.status(), Some(StreamStatus::Ready));
}

#[tokio::test]
async fn history_survives_switching_away_and_back() {
    let server = MockServer::start().await;
    mount_reply(&server, &["Hello"]).await;

    let mut nav = http_navigator(endpoints(&server));
    let first = nav.active_thread();
    nav.send(NonEmptyString::new("hi").unwrap());
    wait_for_chat_idle(&nav.session().status_getter(), WAIT).await;
    let expected = vec![
        ChatMessage::user(NonEmptyString::new("hi").unwrap()),
        ChatMessage::assistant("Hello"),
    ];
    assert_eq!(nav.session().messages(), expected);

    nav.new_thread().await;
    assert!(nav.session().messages().is_empty());
    nav.switch_thread(first).await.unwrap();

    assert_eq!(nav.session().messages(), expected);
}

#[tokio::test]
async fn finished_reply_is_on_disk_before_session_goes_idle() {
    let server = MockServer::start().await;
    mount_reply(&server, &["Saved", " reply"]).await;

    let nav = http_navigator(endpoints(&server));
    let thread = nav.active_thread();
    nav.session().send(NonEmptyString::new("persist me").unwrap());
    wait_for_chat_idle(&nav.session().status_getter(), WAIT).await;

    let on_disk = FileThreadStore::new(nav.history.path())
        .load_messages(thread)
        .await
        .unwrap();
    assert_eq!(on_disk.last(), Some(&ChatMessage::assistant("Saved reply")));
}
