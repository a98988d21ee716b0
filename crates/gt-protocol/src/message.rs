//! Streaming vocabulary: decoded wire events and the fragments extracted from them.

use serde_json::Value;

/// Payload that terminates a chat-completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A JSON chunk (`{"choices": [{"delta": ...}], "citations": [...]}`).
    Data(Value),
    /// The `[DONE]` sentinel.
    Done,
}

impl StreamEvent {
    /// Classify a raw `data:` payload. Returns the JSON parse error for
    /// payloads that are neither JSON nor the sentinel.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        if payload.trim() == DONE_SENTINEL {
            return Ok(Self::Done);
        }
        serde_json::from_str(payload).map(Self::Data)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Fragments extracted from a single event. All present fields are logically
/// simultaneous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub reasoning: Option<String>,
    pub content: Option<String>,
    pub citations: Option<Vec<String>>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.reasoning.is_none() && self.content.is_none() && self.citations.is_none()
    }

    /// Split into fragments in application order: citations, reasoning, content.
    pub fn into_fragments(self) -> Vec<Fragment> {
        let mut fragments = Vec::with_capacity(3);
        if let Some(citations) = self.citations {
            fragments.push(Fragment::Citations(citations));
        }
        if let Some(text) = self.reasoning {
            fragments.push(Fragment::Reasoning(text));
        }
        if let Some(text) = self.content {
            fragments.push(Fragment::Content(text));
        }
        fragments
    }
}

/// A single semantic piece of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Reasoning(String),
    Content(String),
    /// Replaces any previously delivered list.
    Citations(Vec<String>),
}

/// Kind of visible text, used by renderers to pick a style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Reasoning,
    Content,
}
