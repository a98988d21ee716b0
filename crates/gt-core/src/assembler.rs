//! Stream assembly: folds fragments into one logical assistant message.
//!
//! The reply moves through `Idle -> Thinking -> Responding -> Done`. A
//! thinking block can only precede the response: the first content fragment
//! closes it, and any reasoning arriving later is dropped so the closed block
//! never changes.

use gt_protocol::{ChatMessage, Fragment, FragmentKind, Role};
use serde_json::Value;

/// Opens the thinking block.
pub const THINKING_HEADER: &str = "> Thought Process:\n```thinking\n";
/// Closes the thinking block.
pub const THINKING_FOOTER: &str = "\n```\n\n";
/// Separates a closed thinking block from the answer.
pub const RESPONSE_SEPARATOR: &str = "\n> AI Response:  \n\n";
/// Heads the rendered citation list.
pub const CITATIONS_HEADER: &str = "\n\n> Citations:  \n\n";

/// Assembly phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Thinking,
    Responding,
    Done,
}

/// Text that became visible by applying one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleChunk {
    pub kind: FragmentKind,
    pub text: String,
}

/// The finished reply of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub role: Role,
    pub content: String,
    pub citations: Option<Vec<String>>,
}

impl AssembledMessage {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_chat_message(self) -> ChatMessage {
        ChatMessage::assistant(self.content).with_citations(self.citations)
    }
}

/// Fold accumulator for a single stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyState {
    phase: Phase,
    thinking_buffer: String,
    reply_buffer: String,
    citations: Option<Vec<String>>,
    last_event: Option<Value>,
    dropped_reasoning: usize,
}

impl Default for AssemblyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one fragment to `state`, returning the new state.
pub fn fold(mut state: AssemblyState, fragment: Fragment) -> AssemblyState {
    state.apply(fragment);
    state
}

impl AssemblyState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            thinking_buffer: String::new(),
            reply_buffer: String::new(),
            citations: None,
            last_event: None,
            dropped_reasoning: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_thinking_open(&self) -> bool {
        self.phase == Phase::Thinking
    }

    pub fn is_thinking_closed(&self) -> bool {
        !self.thinking_buffer.is_empty()
            && matches!(self.phase, Phase::Responding | Phase::Done)
    }

    pub fn thinking_text(&self) -> &str {
        &self.thinking_buffer
    }

    pub fn citations(&self) -> Option<&[String]> {
        self.citations.as_deref()
    }

    /// Reasoning fragments ignored because the thinking block was already closed.
    pub fn dropped_reasoning(&self) -> usize {
        self.dropped_reasoning
    }

    pub fn last_event(&self) -> Option<&Value> {
        self.last_event.as_ref()
    }

    /// Remember the most recent raw event, for diagnostics.
    pub fn record_event(&mut self, event: Value) {
        self.last_event = Some(event);
    }

    /// Apply one fragment. Returns the newly visible text, if any.
    pub fn apply(&mut self, fragment: Fragment) -> Option<VisibleChunk> {
        match fragment {
            Fragment::Citations(citations) => {
                self.citations = Some(citations);
                None
            }
            Fragment::Reasoning(text) => self.apply_reasoning(text),
            Fragment::Content(text) => self.apply_content(text),
        }
    }

    fn apply_reasoning(&mut self, text: String) -> Option<VisibleChunk> {
        if text.is_empty() {
            return None;
        }
        match self.phase {
            Phase::Idle | Phase::Thinking => {
                self.phase = Phase::Thinking;
                self.thinking_buffer.push_str(&text);
                Some(VisibleChunk {
                    kind: FragmentKind::Reasoning,
                    text,
                })
            }
            Phase::Responding | Phase::Done => {
                self.dropped_reasoning += 1;
                tracing::debug!(len = text.len(), "reasoning after response start dropped");
                None
            }
        }
    }

    fn apply_content(&mut self, text: String) -> Option<VisibleChunk> {
        if text.is_empty() {
            return None;
        }
        match self.phase {
            Phase::Thinking => {
                self.close_thinking();
                tracing::debug!(thinking_len = self.thinking_buffer.len(), "thinking completed");
            }
            Phase::Idle | Phase::Responding => {}
            Phase::Done => {
                tracing::warn!(len = text.len(), "content after stream end ignored");
                return None;
            }
        }
        self.phase = Phase::Responding;
        self.reply_buffer.push_str(&text);
        Some(VisibleChunk {
            kind: FragmentKind::Content,
            text,
        })
    }

    /// Move the closed thinking block and separator into the reply.
    fn close_thinking(&mut self) {
        self.reply_buffer.push_str(THINKING_HEADER);
        self.reply_buffer.push_str(&self.thinking_buffer);
        self.reply_buffer.push_str(THINKING_FOOTER);
        self.reply_buffer.push_str(RESPONSE_SEPARATOR);
    }

    /// Current logical text: the thinking block (open or closed), the reply
    /// so far, and the citation list if one has arrived. Pure in `self`.
    pub fn snapshot(&self) -> String {
        let mut text = match self.phase {
            Phase::Thinking => format!("{THINKING_HEADER}{}", self.thinking_buffer),
            Phase::Idle | Phase::Responding | Phase::Done => self.reply_buffer.clone(),
        };
        if let Some(citations) = &self.citations {
            text.push_str(&format_citations(citations));
        }
        text
    }

    /// Finalize. An open thinking block is closed so partial reasoning survives.
    pub fn finish(mut self) -> AssembledMessage {
        if self.phase == Phase::Thinking {
            self.close_thinking();
        }
        self.phase = Phase::Done;
        AssembledMessage {
            role: Role::Assistant,
            content: self.reply_buffer,
            citations: self.citations,
        }
    }
}

/// Render a citation list as a numbered markdown block. Empty lists render nothing.
pub fn format_citations(citations: &[String]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut text = String::from(CITATIONS_HEADER);
    for (i, citation) in citations.iter().enumerate() {
        text.push_str(&format!("[{}] {citation}  \n", i + 1));
    }
    text
}
