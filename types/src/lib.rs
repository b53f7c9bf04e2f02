//! Core domain types for threadline.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod ids;
pub use ids::{InvalidThreadIdError, ThreadId};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("message content must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

// ============================================================================
// Stream Status
// ============================================================================

/// Lifecycle status of a chat response stream.
///
/// `Submitted` and `Streaming` are the only busy states. Everything else,
/// including an unknown status (`None` at the call sites that read it), is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// No request in flight. Also the state after an abort.
    #[default]
    Ready,
    /// Request issued, no response chunk received yet.
    Submitted,
    /// Response chunks are arriving.
    Streaming,
    /// The last request ended with an error.
    Error,
}

impl StreamStatus {
    pub const ALL: [StreamStatus; 4] = [
        StreamStatus::Ready,
        StreamStatus::Submitted,
        StreamStatus::Streaming,
        StreamStatus::Error,
    ];

    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, StreamStatus::Submitted | StreamStatus::Streaming)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Ready => "ready",
            StreamStatus::Submitted => "submitted",
            StreamStatus::Streaming => "streaming",
            StreamStatus::Error => "error",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stream status: {0:?}")]
pub struct UnknownStatusError(pub String);

impl FromStr for StreamStatus {
    type Err = UnknownStatusError;

    /// Legacy idle spellings (`idle`, `initial`, `aborted`) map to `Ready`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" | "idle" | "initial" | "aborted" => Ok(StreamStatus::Ready),
            "submitted" => Ok(StreamStatus::Submitted),
            "streaming" => Ok(StreamStatus::Streaming),
            "error" => Ok(StreamStatus::Error),
            _ => Err(UnknownStatusError(s.to_string())),
        }
    }
}

/// `None` means the status is unknown, which counts as idle.
#[must_use]
pub fn is_idle(status: Option<StreamStatus>) -> bool {
    !status.is_some_and(StreamStatus::is_busy)
}

// ============================================================================
// Messages & Threads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a thread's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: NonEmptyString) -> Self {
        Self {
            role: Role::User,
            content: content.into_inner(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Entry in the thread list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub title: String,
}

impl ThreadSummary {
    /// Placeholder entry for a thread that has no title yet.
    #[must_use]
    pub fn untitled(id: ThreadId) -> Self {
        Self {
            id,
            title: format!("Chat: {id}"),
        }
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Normalized event delivered by a chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text content delta.
    TextDelta(String),
    /// Stream completed.
    Done,
    /// Error occurred.
    Error(String),
}
