//! Mock SSE source for testing.
//!
//! Produces the same byte framing a chat-completions endpoint sends, so tests
//! at every layer can exercise the real decoder without HTTP.

use std::io;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::decoder::{decode_sse, EventStream};

/// One scripted item of a mock response body.
#[derive(Debug, Clone)]
pub enum MockFrame {
    /// A `data:` frame carrying this JSON chunk.
    Json(Value),
    /// A `data:` frame with an arbitrary payload (e.g. malformed JSON).
    Raw(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Pause before the next frame.
    Delay { ms: u64 },
    /// Fail the connection.
    TransportError { message: String },
}

impl MockFrame {
    /// `{"choices":[{"delta":{"content": text}}]}`
    pub fn content(text: &str) -> Self {
        Self::Json(json!({"choices": [{"index": 0, "delta": {"content": text}}]}))
    }

    /// `{"choices":[{"delta":{"reasoning_content": text}}]}`
    pub fn reasoning(text: &str) -> Self {
        Self::Json(json!({"choices": [{"index": 0, "delta": {"reasoning_content": text}}]}))
    }

    /// A chunk carrying only a top-level citation list.
    pub fn citations(urls: &[&str]) -> Self {
        Self::Json(json!({"citations": urls, "choices": [{"index": 0, "delta": {}}]}))
    }
}

/// Configuration for a mock response body.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub frames: Vec<MockFrame>,
    /// Optional delay between frames (ms).
    pub chunk_delay_ms: Option<u64>,
    /// Split every frame into chunks of this many bytes.
    pub split_bytes: Option<usize>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(mut self, frames: Vec<MockFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }

    pub fn with_split(mut self, bytes: usize) -> Self {
        self.split_bytes = Some(bytes.max(1));
        self
    }
}

fn encode(payload: &str) -> Vec<u8> {
    format!("data: {payload}\n\n").into_bytes()
}

/// Raw SSE body bytes for the scripted frames.
pub fn mock_body(config: MockConfig) -> impl Stream<Item = Result<Bytes, io::Error>> + Send {
    stream! {
        for frame in config.frames {
            if let Some(delay_ms) = config.chunk_delay_ms {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            let bytes = match frame {
                MockFrame::Json(value) => encode(&value.to_string()),
                MockFrame::Raw(payload) => encode(&payload),
                MockFrame::Done => encode(gt_protocol::DONE_SENTINEL),
                MockFrame::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                    continue;
                }
                MockFrame::TransportError { message } => {
                    yield Err(io::Error::new(io::ErrorKind::ConnectionReset, message));
                    return;
                }
            };

            match config.split_bytes {
                Some(size) => {
                    for piece in bytes.chunks(size) {
                        yield Ok(Bytes::copy_from_slice(piece));
                    }
                }
                None => yield Ok(Bytes::from(bytes)),
            }
        }
    }
}

/// Decoded chunk stream for the scripted frames.
pub fn mock_events(config: MockConfig) -> EventStream {
    decode_sse(Box::pin(mock_body(config)))
}

/// Built-in scripts for common scenarios.
pub mod fixtures {
    use super::*;

    /// Content chunks followed by the sentinel.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let mut frames: Vec<MockFrame> = chunks.iter().map(|c| MockFrame::content(c)).collect();
        frames.push(MockFrame::Done);
        MockConfig::new().with_frames(frames)
    }

    /// Reasoning chunks, then content chunks, then the sentinel.
    pub fn thinking_then_text(thinking: &[&str], text: &[&str]) -> MockConfig {
        let mut frames: Vec<MockFrame> = thinking.iter().map(|t| MockFrame::reasoning(t)).collect();
        frames.extend(text.iter().map(|c| MockFrame::content(c)));
        frames.push(MockFrame::Done);
        MockConfig::new().with_frames(frames)
    }

    /// Some content, then a dropped connection.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_frames(vec![
            MockFrame::content(text_before),
            MockFrame::TransportError {
                message: error.to_string(),
            },
        ])
    }
}
