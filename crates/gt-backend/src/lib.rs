//! gt-backend: chat-completions transport for gpt-term.
//!
//! SSE framing, event decoding, the OpenAI-compatible HTTP client, and a
//! mock SSE source used by tests.

pub mod decoder;
pub mod mock;
pub mod openai;
pub mod sse;

pub use decoder::{decode_frames, decode_sse, DecodeError, EventStream};
pub use mock::{MockConfig, MockFrame};
pub use openai::{completion_text, ChatClient, ChatError};
