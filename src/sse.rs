//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! Chat-completion streams carry one JSON chunk per `data:` line and finish
//! with a literal `data: [DONE]` event. This module turns the raw response
//! bytes into a stream of parsed [`ChatCompletionChunk`] values.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_EVENTS};
use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// Marker the server sends as the final event of a stream.
const DONE_MARKER: &str = "[DONE]";

/// One decoded SSE event.
#[derive(Debug)]
enum SseEvent {
    Chunk(Result<ChatCompletionChunk>),
    Done,
    Skip,
}

/// Process a stream of bytes into a stream of chat completion chunks.
///
/// Events split across network reads are reassembled. The output stream ends
/// at the `[DONE]` marker or when the byte stream ends, whichever is first.
/// Transport errors are surfaced as [`Error::Streaming`] items.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });
    process_event_bytes(stream)
}

/// Decode already error-mapped bytes; split out so tests can feed arbitrary errors.
fn process_event_bytes<S>(stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let buffer = String::new();
    let pending: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, pending, false),
        move |(mut stream, mut buffer, mut pending, mut finished)| async move {
            loop {
                if finished {
                    return None;
                }

                // First check if we have a complete event in the buffer
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        SseEvent::Chunk(chunk) => {
                            STREAM_EVENTS.click();
                            return Some((chunk, (stream, buffer, pending, finished)));
                        }
                        SseEvent::Done => {
                            finished = true;
                            continue;
                        }
                        SseEvent::Skip => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        pending.extend_from_slice(&bytes);
                        // A multi-byte character may straddle two reads.
                        let mut valid = match std::str::from_utf8(&pending) {
                            Ok(_) => pending.len(),
                            Err(e) if e.error_len().is_none() => e.valid_up_to(),
                            Err(e) => {
                                pending.clear();
                                return Some((
                                    Err(Error::encoding(
                                        format!("Invalid UTF-8 in stream: {e}"),
                                        Some(Box::new(e)),
                                    )),
                                    (stream, buffer, pending, finished),
                                ));
                            }
                        };
                        // Hold a trailing \r back until its \n arrives.
                        if valid > 0 && pending[valid - 1] == b'\r' {
                            valid -= 1;
                        }
                        let text = String::from_utf8_lossy(&pending[..valid]).replace("\r\n", "\n");
                        buffer.push_str(&text);
                        pending.drain(..valid);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, pending, finished)));
                    }
                    None => {
                        // End of stream; a trailing event may lack its blank line.
                        finished = true;
                        if !pending.is_empty() {
                            buffer.push_str(&String::from_utf8_lossy(&pending));
                            pending.clear();
                        }
                        if !buffer.trim().is_empty() {
                            let tail = std::mem::take(&mut buffer);
                            if let SseEvent::Chunk(chunk) = parse_event(&tail) {
                                STREAM_EVENTS.click();
                                return Some((chunk, (stream, buffer, pending, finished)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract a complete SSE event from a buffer string.
///
/// Events are delimited by a blank line.
fn extract_event(buffer: &str) -> Option<(SseEvent, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    Some((parse_event(event_text), rest.to_string()))
}

/// Parse the lines of a single event.
///
/// Comment lines (leading `:`) and fields other than `data` are ignored.
/// Multiple `data` lines are joined with newlines.
fn parse_event(event_text: &str) -> SseEvent {
    let mut data: Option<String> = None;
    for line in event_text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    match data.as_deref().map(str::trim) {
        None | Some("") => SseEvent::Skip,
        Some(DONE_MARKER) => SseEvent::Done,
        Some(json) => SseEvent::Chunk(serde_json::from_str::<ChatCompletionChunk>(json).map_err(
            |e| {
                Error::serialization(
                    format!("Failed to parse chunk JSON: {e}"),
                    Some(Box::new(e)),
                )
            },
        )),
    }
}
