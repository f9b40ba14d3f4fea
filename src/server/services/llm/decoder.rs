//! Incremental decoder for the upstream SSE token stream.
//!
//! The upstream sends `data: <json>` lines terminated by a literal
//! `data: [DONE]` sentinel, chunked at arbitrary byte boundaries. The decoder
//! reassembles lines across chunks and yields [`TokenEvent`]s lazily, ending
//! every stream with exactly one `Done` or `Error`.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::types::{StreamResponse, TokenEvent};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw bytes and hands back complete newline-terminated lines.
/// Bytes after the last newline stay buffered until the next chunk; anything
/// left at end-of-stream is dropped, never emitted as a partial line. The
/// buffer holds raw bytes and decodes per complete line, so a multibyte
/// character split across chunks comes through intact.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).trim().to_string());
        }
        lines
    }
}

enum LineEvent {
    Skip,
    Done,
    Deltas(Vec<String>),
}

fn parse_line(line: &str) -> LineEvent {
    let data = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    if data.is_empty() {
        return LineEvent::Skip;
    }
    if data == DONE_SENTINEL {
        return LineEvent::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(response) => LineEvent::Deltas(
            response
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .collect(),
        ),
        // keep-alives and comment lines are not data; skip and keep decoding
        Err(_) => LineEvent::Skip,
    }
}

/// Wraps a raw byte source into a lazy stream of [`TokenEvent`]s. The caller
/// drives pacing by polling; dropping the returned stream drops the source,
/// which aborts an in-flight upstream request.
pub fn decode_sse<S, E>(source: S) -> impl Stream<Item = TokenEvent>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(source);
        let mut buffer = LineBuffer::default();
        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in buffer.push(&chunk) {
                        match parse_line(&line) {
                            LineEvent::Skip => {}
                            LineEvent::Done => {
                                yield TokenEvent::Done;
                                return;
                            }
                            LineEvent::Deltas(deltas) => {
                                for delta in deltas {
                                    yield TokenEvent::Delta(delta);
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    yield TokenEvent::Error(format!("stream read failed: {e}"));
                    return;
                }
            }
        }
        // upstream closed without the sentinel; terminate the exchange anyway
        yield TokenEvent::Done;
    }
}
