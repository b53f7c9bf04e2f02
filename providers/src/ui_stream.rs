//! The chat route's UI message stream: request body and response reader.
//!
//! Only the chunks that move the exchange are interpreted. `start` opens
//! the assistant message, `text-delta` extends it, and `finish` or `abort`
//! close it; `error` fails it. Tool, reasoning and metadata chunks are
//! skipped without inspection.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use threadline_types::{ChatMessage, Role, StreamEvent, ThreadId};

use crate::Result;
use crate::sse::SseDecoder;

/// Sentinel some servers send after the last chunk.
const DONE_SENTINEL: &str = "[DONE]";

/// Consecutive unreadable payloads tolerated before the stream is failed.
const MAX_BAD_PAYLOADS: usize = 3;

const CLOSED_EARLY: &str = "Connection closed before the response finished";

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a> {
    id: ThreadId,
    messages: Vec<UiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UiMessage<'a> {
    role: Role,
    parts: [UiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum UiPart<'a> {
    Text { text: &'a str },
}

impl<'a> ChatRequestBody<'a> {
    pub(crate) fn new(id: ThreadId, messages: &'a [ChatMessage]) -> Self {
        let messages = messages
            .iter()
            .map(|message| UiMessage {
                role: message.role,
                parts: [UiPart::Text {
                    text: &message.content,
                }],
            })
            .collect();
        Self { id, messages }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum UiChunk {
    Start {
        #[serde(rename = "messageId", default)]
        message_id: Option<String>,
    },
    TextDelta {
        #[serde(alias = "textDelta")]
        delta: String,
    },
    Finish,
    Abort,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Delta(String),
    Finished,
    Failed(String),
}

/// Per-response state: which assistant message is open and how many
/// payloads in a row failed to parse.
#[derive(Debug, Default)]
struct ReplyState {
    message_id: Option<String>,
    bad_payloads: usize,
}

impl ReplyState {
    fn on_payload(&mut self, payload: &str) -> Flow {
        if payload == DONE_SENTINEL {
            return Flow::Finished;
        }

        let chunk = match serde_json::from_str::<UiChunk>(payload) {
            Ok(chunk) => {
                self.bad_payloads = 0;
                chunk
            }
            Err(e) => {
                self.bad_payloads += 1;
                tracing::warn!(error = %e, payload_bytes = payload.len(), "Unreadable UI stream chunk");
                if self.bad_payloads >= MAX_BAD_PAYLOADS {
                    return Flow::Failed(format!("Invalid stream payload: {e}"));
                }
                return Flow::Continue;
            }
        };

        match chunk {
            UiChunk::Start { message_id } => {
                tracing::debug!(message_id = ?message_id, "Assistant message started");
                self.message_id = message_id;
                Flow::Continue
            }
            UiChunk::TextDelta { delta } if delta.is_empty() => Flow::Continue,
            UiChunk::TextDelta { delta } => Flow::Delta(delta),
            UiChunk::Finish => Flow::Finished,
            // The server stopped the run itself; what arrived so far stands.
            UiChunk::Abort => {
                tracing::info!(message_id = ?self.message_id, "Server aborted the response");
                Flow::Finished
            }
            UiChunk::Error { error_text } => Flow::Failed(error_text),
            UiChunk::Other => Flow::Continue,
        }
    }
}

/// Read the response body, forwarding deltas and then exactly one terminal
/// event.
///
/// A receiver that is gone ends the read quietly with `Ok(())`; the session
/// already moved on.
pub(crate) async fn read_ui_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) -> Result<()> {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();
    let mut state = ReplyState::default();

    let terminal = 'read: loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, body.next()).await else {
            break StreamEvent::Error(format!(
                "No data from server for {}s",
                idle_timeout.as_secs()
            ));
        };
        let Some(bytes) = next else {
            break StreamEvent::Error(CLOSED_EARLY.to_string());
        };
        if let Err(e) = decoder.feed(&bytes?) {
            break StreamEvent::Error(e.to_string());
        }

        while let Some(payload) = decoder.next_payload() {
            match state.on_payload(&payload) {
                Flow::Continue => {}
                Flow::Delta(text) => {
                    if tx.send(StreamEvent::TextDelta(text)).await.is_err() {
                        tracing::debug!("Reply receiver closed; ending read");
                        return Ok(());
                    }
                }
                Flow::Finished => break 'read StreamEvent::Done,
                Flow::Failed(message) => break 'read StreamEvent::Error(message),
            }
        }
    };

    let _ = tx.send(terminal).await;
    Ok(())
}
