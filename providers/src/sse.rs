//! Incremental server-sent event decoding.
//!
//! Bytes are split into lines as they arrive (`\n`, `\r\n` or a lone `\r`);
//! a blank line dispatches the `data` collected since the previous blank
//! line. Comments and the `event`, `id` and `retry` fields carry nothing the
//! chat stream uses and are ignored.

use std::collections::VecDeque;

use thiserror::Error;

/// Ceiling on bytes held for an event that has not been dispatched yet.
pub(crate) const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SseError {
    #[error("Server-sent event exceeded {} MiB without completing", MAX_PENDING_BYTES / (1024 * 1024))]
    Oversized,
    #[error("Received invalid UTF-8 from the event stream")]
    InvalidUtf8,
}

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    line: Vec<u8>,
    data: Option<String>,
    after_cr: bool,
    ready: VecDeque<String>,
}

impl SseDecoder {
    /// Consume a chunk of the body. Completed payloads become available
    /// through [`SseDecoder::next_payload`].
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<(), SseError> {
        for &byte in bytes {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\n' => self.end_line()?,
                b'\r' => {
                    self.after_cr = true;
                    self.end_line()?;
                }
                _ => self.line.push(byte),
            }
        }

        if self.pending_bytes() > MAX_PENDING_BYTES {
            return Err(SseError::Oversized);
        }
        Ok(())
    }

    pub(crate) fn next_payload(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Bytes belonging to the event still being assembled.
    fn pending_bytes(&self) -> usize {
        self.line.len() + self.data.as_ref().map_or(0, String::len)
    }

    fn end_line(&mut self) -> Result<(), SseError> {
        if self.line.is_empty() {
            if let Some(data) = self.data.take() {
                self.ready.push_back(data);
            }
            return Ok(());
        }

        let line = String::from_utf8(std::mem::take(&mut self.line)).map_err(|_| SseError::InvalidUtf8)?;
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        Ok(())
    }
}
