//! Event decoder: SSE frames to chat-completion JSON chunks.
//!
//! The sequence ends at the `[DONE]` sentinel (not yielded) or after the first
//! transport error. A malformed payload fails only its own item.

use std::fmt::Display;
use std::pin::Pin;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use gt_protocol::StreamEvent;
use serde_json::Value;
use thiserror::Error;

use crate::sse::{parse_sse_stream, SseFrame};

#[derive(Debug, Error)]
pub enum DecodeError {
    /// A frame whose payload is neither JSON nor the sentinel. Non-fatal.
    #[error("malformed event payload {payload:?}: {source}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
    /// The connection failed mid-stream. Always the last item.
    #[error("stream transport error: {0}")]
    Transport(String),
}

impl DecodeError {
    /// Whether the sequence ends after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Boxed stream of decoded chunks.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Value, DecodeError>> + Send>>;

/// Decode SSE frames into JSON chunks.
pub fn decode_frames<S, E>(frames: S) -> EventStream
where
    S: Stream<Item = Result<SseFrame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let mut frames = frames;
        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(DecodeError::Transport(e.to_string()));
                    return;
                }
            };

            match StreamEvent::from_payload(&frame.data) {
                Ok(StreamEvent::Done) => {
                    tracing::debug!("stream sentinel received");
                    return;
                }
                Ok(StreamEvent::Data(value)) => yield Ok(value),
                Err(source) => {
                    yield Err(DecodeError::Malformed {
                        payload: frame.data,
                        source,
                    });
                }
            }
        }
        tracing::debug!("stream closed without sentinel");
    })
}

/// Decode a raw SSE byte stream (e.g. an HTTP response body) into JSON chunks.
pub fn decode_sse<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    decode_frames(parse_sse_stream(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from_static(s.as_bytes()))))
    }

    #[tokio::test]
    async fn stops_at_sentinel() {
        let events: Vec<_> = decode_sse(body(vec![
            "data: {\"n\":1}\n\n",
            "data: [DONE]\n\n",
            "data: {\"n\":2}\n\n",
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &json!({"n": 1}));
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_sequence() {
        let events: Vec<_> = decode_sse(body(vec![
            "data: {\"n\":1}\n\n",
            "data: {oops\n\n",
            "data: {\"n\":2}\n\n",
            "data: [DONE]\n\n",
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 3);
        assert!(events[0].is_ok());
        match &events[1] {
            Err(DecodeError::Malformed { payload, .. }) => assert_eq!(payload, "{oops"),
            other => panic!("expected malformed error, got {other:?}"),
        }
        assert!(!events[1].as_ref().unwrap_err().is_terminal());
        assert_eq!(events[2].as_ref().unwrap(), &json!({"n": 2}));
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out")),
        ];
        let events: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;

        assert_eq!(events.len(), 2);
        let err = events[1].as_ref().unwrap_err();
        assert!(err.is_terminal());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn connection_close_without_sentinel_ends_cleanly() {
        let events: Vec<_> = decode_sse(body(vec!["data: {\"n\":1}\n\n"])).collect().await;
        assert_eq!(events.len(), 1);
    }
}
