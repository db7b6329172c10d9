//! Upstream stream decoding and SSE framing.
//!
//! The vendor streams newline-delimited JSON objects whose boundaries do
//! not line up with network reads, so [`StreamDecoder`] reassembles lines
//! from raw chunks before translating them. Decoding is deliberately
//! lossy: a line that does not parse, or parses to something without a
//! usable candidate, is dropped and the stream carries on. The produced
//! event sequence is finite and single-pass, and always ends with exactly
//! one `[DONE]` sentinel frame.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use super::types::{ChatCompletionChunk, ChunkChoice, Delta, UpstreamResponse};

/// Cap on bytes buffered while waiting for a line separator. A line that
/// grows past this is discarded wholesale, same as any other unusable line.
const MAX_LINE_BYTES: usize = 256 * 1024;

/// Line-buffered translator from upstream bytes to OpenAI-style deltas.
pub(crate) struct StreamDecoder {
    buffer: Vec<u8>,
    model: String,
    created: i64,
}

impl StreamDecoder {
    pub fn new(model: impl Into<String>, created: i64) -> Self {
        StreamDecoder {
            buffer: Vec::new(),
            model: model.into(),
            created,
        }
    }

    /// Append a chunk and translate every complete line it closes off.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ChatCompletionChunk> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::debug!(
                buffered = self.buffer.len(),
                "Dropping oversized unterminated upstream line"
            );
            self.buffer.clear();
        }

        events
    }

    /// Translate whatever is still buffered once the upstream has ended.
    pub fn drain(&mut self) -> Vec<ChatCompletionChunk> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    /// One line in, at most one delta out. Empty lines, unparseable lines,
    /// and lines without a usable candidate part all yield nothing.
    fn decode_line(&self, line: &[u8]) -> Option<ChatCompletionChunk> {
        let line = std::str::from_utf8(line).ok()?.trim();
        if line.is_empty() {
            return None;
        }

        let parsed: UpstreamResponse = serde_json::from_str(line).ok()?;
        let candidate = parsed.candidates?.into_iter().next()?;
        let text = candidate.content.as_ref()?.parts.first()?.text.clone();

        Some(ChatCompletionChunk {
            id: format!("chatcmpl-{}", self.created),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: "assistant".to_string(),
                    content: text,
                },
                finish_reason: candidate.finish_reason,
            }],
        })
    }
}

/// Render one delta as an SSE frame.
fn sse_frame(chunk: &ChatCompletionChunk) -> Bytes {
    // Serialization of our own types cannot fail.
    let json = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {}\n\n", json))
}

/// The fixed terminal marker of every streamed response.
fn sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Turn the upstream byte stream into a finite sequence of SSE frames.
///
/// Every usable upstream line becomes one `data:` frame; after the
/// upstream ends (normally or abruptly, including a transport error
/// mid-stream), the remaining buffer is drained and exactly one `[DONE]`
/// frame closes the sequence.
pub(crate) fn sse_frames<S, E>(
    upstream: S,
    model: &str,
    created: i64,
) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    struct State {
        decoder: StreamDecoder,
        finished: bool,
    }

    let state = State {
        decoder: StreamDecoder::new(model, created),
        finished: false,
    };

    // `None` marks the end of the upstream; it is what triggers the drain
    // and the sentinel.
    upstream
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(state, |state, item| {
            let frames: Vec<Bytes> = if state.finished {
                Vec::new()
            } else {
                match item {
                    Some(Ok(chunk)) => {
                        state.decoder.feed(&chunk).iter().map(sse_frame).collect()
                    }
                    Some(Err(e)) => {
                        // Abrupt upstream end: stop reading, close out now.
                        tracing::warn!(error = %e, "Upstream stream failed mid-response");
                        state.finished = true;
                        let mut frames: Vec<Bytes> =
                            state.decoder.drain().iter().map(sse_frame).collect();
                        frames.push(sse_done());
                        frames
                    }
                    None => {
                        state.finished = true;
                        let mut frames: Vec<Bytes> =
                            state.decoder.drain().iter().map(sse_frame).collect();
                        frames.push(sse_done());
                        frames
                    }
                }
            };
            futures::future::ready(Some(frames))
        })
        .flat_map(stream::iter)
        .map(Ok)
}
