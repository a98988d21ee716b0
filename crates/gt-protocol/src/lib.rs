//! gt-protocol: Shared types for gpt-term.
//!
//! Defines the conversation types exchanged with the chat backend and the
//! streaming vocabulary (decoded events, deltas, fragments) shared by the
//! backend decoder and the core assembler.

pub mod chat;
pub mod message;

pub use chat::{ChatMessage, ChatRequest, Role, ThinkingConfig};
pub use message::{Delta, Fragment, FragmentKind, StreamEvent, DONE_SENTINEL};
