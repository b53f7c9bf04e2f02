//! HTTP clients for the chat backend.
//!
//! # Architecture
//!
//! - [`stream_chat`] - POST the thread to the chat route and forward the
//!   server-sent UI message stream as [`StreamEvent`]s
//! - [`cancel_run`] - advisory server-side run cancellation
//! - [`delete_thread`] - remove a thread and its stored message log
//!
//! All three share one pooled [`reqwest::Client`] and a validated
//! [`ChatEndpoints`] describing where the routes live.
//!
//! # Error Handling
//!
//! Stream failures that happen after the request was accepted (HTTP errors,
//! bad payloads, idle timeouts) are delivered as `StreamEvent::Error` so the
//! consumer sees partial output before the error. Failures that prevent reading
//! the body at all return `Err`.

mod sse;
mod ui_stream;

pub(crate) use anyhow::Result;
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use threadline_types::{ChatMessage, StreamEvent, ThreadId};

use ui_stream::{ChatRequestBody, read_ui_stream};

pub use threadline_types;

/// Default chat route of the web application.
pub const DEFAULT_CHAT_PATH: &str = "/ai";
/// Default thread deletion route; the thread id is appended as a path segment.
pub const DEFAULT_DELETE_PATH: &str = "/api/chat/delete";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

/// Bytes of a failed response's body kept for the error message.
const ERROR_BODY_LIMIT: usize = 32 * 1024;

/// Placeholder in `cancel_path` replaced by the thread id.
const THREAD_ID_PLACEHOLDER: &str = "{id}";

static CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let builder = reqwest::Client::builder()
        .user_agent(concat!("threadline/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT);
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "HTTP client settings rejected; using reqwest defaults");
        reqwest::Client::new()
    })
});

/// Client shared by every request so connections to the chat server are reused.
pub fn http_client() -> &'static reqwest::Client {
    &CLIENT
}

pub(crate) fn stream_idle_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let timeout = std::env::var("THREADLINE_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);
        Duration::from_secs(timeout)
    })
}

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("base URL must start with http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),
    #[error("route path must start with '/', got {0:?}")]
    InvalidPath(String),
}

/// Where the chat backend's routes live.
///
/// The constructor validates the base URL scheme and route shapes so request
/// builders never see a malformed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEndpoints {
    base_url: String,
    chat_path: String,
    delete_path: String,
    cancel_path: Option<String>,
}

impl ChatEndpoints {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EndpointError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(EndpointError::InvalidBaseUrl(base_url));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            delete_path: DEFAULT_DELETE_PATH.to_string(),
            cancel_path: None,
        })
    }

    pub fn with_chat_path(mut self, path: impl Into<String>) -> Result<Self, EndpointError> {
        self.chat_path = validate_path(path.into())?;
        Ok(self)
    }

    pub fn with_delete_path(mut self, path: impl Into<String>) -> Result<Self, EndpointError> {
        self.delete_path = validate_path(path.into())?;
        Ok(self)
    }

    /// Enable run cancellation. `{id}` in the path is replaced by the thread id.
    pub fn with_cancel_path(mut self, path: impl Into<String>) -> Result<Self, EndpointError> {
        self.cancel_path = Some(validate_path(path.into())?);
        Ok(self)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn supports_run_cancellation(&self) -> bool {
        self.cancel_path.is_some()
    }

    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    #[must_use]
    pub fn delete_url(&self, id: ThreadId) -> String {
        format!(
            "{}{}/{id}",
            self.base_url,
            self.delete_path.trim_end_matches('/')
        )
    }

    #[must_use]
    pub fn cancel_url(&self, id: ThreadId) -> Option<String> {
        let path = self.cancel_path.as_ref()?;
        let path = path.replace(THREAD_ID_PLACEHOLDER, &id.to_string());
        Some(format!("{}{path}", self.base_url))
    }
}

fn validate_path(path: String) -> Result<String, EndpointError> {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Err(EndpointError::InvalidPath(path))
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Describe a failed response: the server's `error` or `message` text when
/// the body is JSON, otherwise the start of the body.
async fn error_summary(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut truncated = false;
    while let Ok(Some(chunk)) = response.chunk().await {
        let room = ERROR_BODY_LIMIT - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        body.extend_from_slice(&chunk);
    }

    if let Ok(json) = serde_json::from_slice::<Value>(&body)
        && let Some(message) = server_message(&json)
    {
        return message.to_string();
    }

    let text = String::from_utf8_lossy(&body);
    let text = text.trim();
    if truncated {
        format!("{text}...")
    } else {
        text.to_string()
    }
}

fn server_message(json: &Value) -> Option<&str> {
    let error = json.get("error");
    error
        .and_then(Value::as_str)
        .or_else(|| error.and_then(|e| e.get("message")).and_then(Value::as_str))
        .or_else(|| json.get("message").and_then(Value::as_str))
}

/// Stream an assistant response for `messages` on thread `id`.
///
/// Events are sent on `tx` until `Done` or `Error`. Dropping the receiver
/// ends the read loop early without an error.
pub async fn stream_chat(
    endpoints: &ChatEndpoints,
    id: ThreadId,
    messages: &[ChatMessage],
    tx: mpsc::Sender<StreamEvent>,
) -> Result<()> {
    let body = ChatRequestBody::new(id, messages);
    let response = http_client()
        .post(endpoints.chat_url())
        .header("accept", "text/event-stream")
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let summary = error_summary(response).await;
        let _ = tx
            .send(StreamEvent::Error(format!("API error {status}: {summary}")))
            .await;
        return Ok(());
    }

    read_ui_stream(response, &tx, stream_idle_timeout()).await
}

/// Ask the server to stop generating for thread `id`.
///
/// Returns `Ok(false)` when no cancel route is configured. The run may have
/// already finished; callers treat errors as advisory.
pub async fn cancel_run(endpoints: &ChatEndpoints, id: ThreadId) -> Result<bool> {
    let Some(url) = endpoints.cancel_url(id) else {
        return Ok(false);
    };

    let response = http_client().post(url).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let summary = error_summary(response).await;
        anyhow::bail!("cancel run failed with {status}: {summary}");
    }
    Ok(true)
}

/// Delete thread `id` on the server.
pub async fn delete_thread(endpoints: &ChatEndpoints, id: ThreadId) -> Result<()> {
    let response = http_client().post(endpoints.delete_url(id)).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let summary = error_summary(response).await;
        anyhow::bail!("delete thread {id} failed with {status}: {summary}");
    }
    Ok(())
}
