//! Stream driver: decoded events through extraction and assembly to a renderer.
//!
//! One stream is consumed by exactly one driver, strictly in order. The
//! cancellation receiver is polled while waiting for the next event and again
//! between every two fragment applications; whichever way the stream ends,
//! whatever was assembled so far is returned.

use futures::{Stream, StreamExt};
use gt_backend::DecodeError;
use gt_protocol::Fragment;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::assembler::{format_citations, AssembledMessage, AssemblyState};
use crate::delta::DeltaExtractor;
use crate::renderer::{RenderMode, Renderer, StyleTag};

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Sentinel received, or the server closed the connection.
    Completed,
    /// The user cancelled.
    Interrupted,
    /// The transport failed mid-stream.
    Failed(String),
}

/// Result of driving one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub message: AssembledMessage,
    pub status: StreamStatus,
    /// Malformed frames that were skipped.
    pub decode_errors: usize,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == StreamStatus::Completed
    }
}

enum Step {
    Event(Value),
    Skip,
    End(StreamStatus),
}

/// Consume `events`, render progressively, and return the assembled reply.
pub async fn process_stream<S, R>(
    mut events: S,
    extractor: &DeltaExtractor,
    renderer: &mut R,
    mode: RenderMode,
    mut cancel: oneshot::Receiver<()>,
) -> StreamOutcome
where
    S: Stream<Item = Result<Value, DecodeError>> + Unpin,
    R: Renderer + ?Sized,
{
    let mut state = AssemblyState::new();
    let mut decode_errors = 0;
    // A dropped sender means nobody can cancel any more; stop polling it.
    let mut cancel_live = true;

    let status = 'stream: loop {
        let step = tokio::select! {
            biased;
            signal = &mut cancel, if cancel_live => match signal {
                Ok(()) => Step::End(StreamStatus::Interrupted),
                Err(_) => {
                    cancel_live = false;
                    Step::Skip
                }
            },
            next = events.next() => match next {
                None => Step::End(StreamStatus::Completed),
                Some(Ok(event)) => Step::Event(event),
                Some(Err(DecodeError::Transport(message))) => {
                    tracing::error!(error = %message, "stream transport failed");
                    Step::End(StreamStatus::Failed(message))
                }
                Some(Err(e)) => {
                    decode_errors += 1;
                    tracing::warn!(error = %e, "skipping malformed stream frame");
                    Step::Skip
                }
            },
        };

        let event = match step {
            Step::Event(event) => event,
            Step::Skip => continue,
            Step::End(status) => break status,
        };

        let fragments = extractor.extract(&event).into_fragments();
        state.record_event(event);

        let mut changed = false;
        for fragment in fragments {
            if cancel_live {
                match cancel.try_recv() {
                    Ok(()) => break 'stream StreamStatus::Interrupted,
                    Err(TryRecvError::Closed) => cancel_live = false,
                    Err(TryRecvError::Empty) => {}
                }
            }
            let is_citations = matches!(fragment, Fragment::Citations(_));
            match state.apply(fragment) {
                Some(chunk) => {
                    changed = true;
                    if mode == RenderMode::Append {
                        renderer.emit_append(&chunk.text, StyleTag::from(chunk.kind));
                    }
                }
                None => changed |= is_citations,
            }
        }

        if changed && mode == RenderMode::Refresh {
            renderer.emit_snapshot(&state.snapshot());
        }
    };

    if mode == RenderMode::Append {
        if let Some(citations) = state.citations() {
            renderer.emit_append(&format_citations(citations), StyleTag::Reply);
        }
    }
    renderer.emit_stream_end();

    if state.dropped_reasoning() > 0 {
        tracing::debug!(dropped = state.dropped_reasoning(), "late reasoning fragments ignored");
    }
    if let Some(last) = state.last_event() {
        tracing::trace!(event = %last, "last stream event");
    }

    let message = state.finish();
    tracing::debug!(
        status = ?status,
        len = message.content.len(),
        decode_errors,
        "stream finished"
    );
    StreamOutcome {
        message,
        status,
        decode_errors,
    }
}

/// Assemble a non-streaming completion the same way a stream would be.
pub fn assemble_completion(response: &Value, extractor: &DeltaExtractor) -> AssembledMessage {
    let mut state = AssemblyState::new();
    for fragment in extractor.extract_message(response).into_fragments() {
        state.apply(fragment);
    }
    state.record_event(response.clone());
    state.finish()
}
