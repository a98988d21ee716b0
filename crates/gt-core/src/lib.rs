//! gt-core: streaming chat client logic for gpt-term.
//!
//! Delta extraction, reply assembly, the stream driver and its terminal
//! renderer, plus the conversation store, chat session and REPL around them.
//! Exposed as a library for integration testing.

pub mod assembler;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod delta;
pub mod logging;
pub mod renderer;
pub mod repl;
pub mod stream;
pub mod style;
pub mod title;
