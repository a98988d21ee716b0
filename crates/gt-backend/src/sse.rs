//! Server-Sent Events (SSE) framing.
//!
//! Splits a byte stream into SSE frames. Lines are cut on raw bytes so a
//! multi-byte UTF-8 character split across network chunks is reassembled
//! before decoding.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// A parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The event type (from `event:` field). None if not specified.
    pub event_type: Option<String>,
    /// The `data:` lines of the frame, joined with `\n`.
    pub data: String,
}

#[derive(Default)]
struct FrameBuilder {
    /// Bytes of the line currently being received.
    line_buf: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
}

impl FrameBuilder {
    fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<SseFrame>) {
        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line_buf);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                    out.push_back(frame);
                }
            } else {
                self.line_buf.push(byte);
            }
        }
    }

    /// Process one complete line. A blank line dispatches the pending frame.
    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }

        // Lines starting with ':' are comments; lines without a colon are ignored.
        let (field, value) = line.split_once(':')?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id, retry and unknown fields carry nothing we use.
            _ => {}
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event_type = None;
            return None;
        }
        let frame = SseFrame {
            event_type: self.event_type.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(frame)
    }

    /// Flush a trailing frame when the connection closes without a blank line.
    fn finish(&mut self) -> Option<SseFrame> {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.take_frame()
    }
}

/// Stream adapter yielding SSE frames from a byte stream.
pub struct SseStream<S> {
    inner: S,
    builder: FrameBuilder,
    pending: VecDeque<SseFrame>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            builder: FrameBuilder::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseFrame, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.builder.feed(&bytes, &mut this.pending);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if let Some(frame) = this.builder.finish() {
                        this.pending.push_back(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create an SSE frame stream from a byte stream.
pub fn parse_sse_stream<S, E>(stream: S) -> SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    SseStream::new(stream)
}
