//! Incremental decoding of provider `text/event-stream` bodies.

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::{DeltaStream, LlmError};

/// Splits an event-stream byte feed into the `data` payload of each event.
///
/// Line endings are normalised to `\n` in the buffer. A chunk ending in `\r`
/// keeps it back until the next chunk shows whether a `\n` follows.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut text = String::with_capacity(chunk.len() + 1);
        if std::mem::take(&mut self.pending_cr) {
            text.push('\r');
        }
        text.push_str(chunk);
        if text.ends_with('\r') {
            text.pop();
            self.pending_cr = true;
        }
        self.buffer
            .push_str(&text.replace("\r\n", "\n").replace('\r', "\n"));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let event = self.buffer[..end].to_string();
            self.buffer.drain(..end + 2);
            if let Some(data) = event_data(&event) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes an event left unterminated when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        self.pending_cr = false;
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

/// Drains the decodable prefix of `pending`. Invalid bytes become U+FFFD; only
/// a multibyte sequence cut off at the end stays behind for the next chunk.
fn take_text(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut start = 0;
    while start < pending.len() {
        match std::str::from_utf8(&pending[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = pending.len();
            }
            Err(err) => {
                let valid_end = start + err.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[start..valid_end]));
                match err.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }
    pending.drain(..start);
    text
}

fn event_data(event: &str) -> Option<String> {
    let lines = event
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|data| data.strip_prefix(' ').unwrap_or(data))
        })
        .collect::<Vec<_>>();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Turns a streaming HTTP response into text deltas. `extract` receives every
/// JSON payload and returns `Ok(Some(text))` for a delta, `Ok(None)` for
/// bookkeeping events and `Err` for provider-reported failures, which end the
/// stream.
pub fn delta_stream<F>(response: reqwest::Response, extract: F) -> DeltaStream
where
    F: Fn(&Value) -> Result<Option<String>, LlmError> + Send + Sync + 'static,
{
    Box::pin(decode_deltas(response.bytes_stream(), extract))
}

pub(crate) fn decode_deltas<S, B, F>(
    bytes: S,
    extract: F,
) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    F: Fn(&Value) -> Result<Option<String>, LlmError> + Send + Sync + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::new();
        let mut pending = Vec::<u8>::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(LlmError::Request(err));
                    return;
                }
            };
            pending.extend_from_slice(chunk.as_ref());
            let text = take_text(&mut pending);

            for payload in decoder.push(&text) {
                match parse_payload(&payload, &extract) {
                    Ok(Some(delta)) => yield Ok(delta),
                    Ok(None) => {}
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }

        if !pending.is_empty() {
            let tail = String::from_utf8_lossy(&pending).into_owned();
            for payload in decoder.push(&tail) {
                match parse_payload(&payload, &extract) {
                    Ok(Some(delta)) => yield Ok(delta),
                    Ok(None) => {}
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            match parse_payload(&payload, &extract) {
                Ok(Some(delta)) => yield Ok(delta),
                Ok(None) => {}
                Err(err) => yield Err(err),
            }
        }
    }
}

fn parse_payload<F>(payload: &str, extract: &F) -> Result<Option<String>, LlmError>
where
    F: Fn(&Value) -> Result<Option<String>, LlmError>,
{
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return Ok(None);
    }
    let value = serde_json::from_str::<Value>(trimmed)
        .map_err(|err| LlmError::Stream(format!("malformed event payload: {err}")))?;
    extract(&value)
}
