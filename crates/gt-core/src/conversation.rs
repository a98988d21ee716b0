//! Conversation history: the ordered turns sent with every request.
//!
//! The first message is always the system prompt. Assistant turns may carry
//! a citation list; it is stored with the turn and written to saved files,
//! but never sent back to the API.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use gt_protocol::{ChatMessage, Role};
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is not a chat history file: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What `delete_first` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedExchange {
    /// First line of the removed question, with `...` if it was longer.
    pub question: String,
    pub tokens_saved: usize,
}

/// Approximate token count for a string (chars / 4).
pub fn approx_tokens(s: &str) -> usize {
    s.chars().count() / 4
}

/// First line of `content`, with `...` if anything was cut.
fn first_line(content: &str) -> String {
    let mut line = content.lines().next().unwrap_or("").to_string();
    if content.len() > line.len() {
        line.push_str("...");
    }
    line
}

fn message_tokens(message: &ChatMessage) -> usize {
    // role and framing overhead
    approx_tokens(&message.content) + 4
}

/// Ordered chat history, starting with a system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStore {
    messages: Vec<ChatMessage>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// New history with the default system prompt stamped with today's date.
    pub fn new() -> Self {
        let date = Local::now().format("%Y-%m-%d");
        Self::with_system_prompt(format!("{SYSTEM_PROMPT}\nCurrent date: {date}"))
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    /// Wrap loaded messages. A system prompt is prepended if the file had none.
    pub fn from_messages(mut messages: Vec<ChatMessage>) -> Self {
        if messages.first().map(|m| m.role) != Some(Role::System) {
            let date = Local::now().format("%Y-%m-%d");
            messages.insert(
                0,
                ChatMessage::system(format!("{SYSTEM_PROMPT}\nCurrent date: {date}")),
            );
        }
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when only the system prompt is present.
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Content of the first user message, if any.
    pub fn first_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// True right after the first question has been answered.
    pub fn is_first_exchange(&self) -> bool {
        self.messages.len() == 3
            && self.messages[1].role == Role::User
            && self.messages[2].role == Role::Assistant
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn append(&mut self, message: ChatMessage) {
        tracing::debug!(role = ?message.role, len = message.content.len(), "turn appended");
        self.messages.push(message);
    }

    /// Remove the newest message. The system prompt is never removed.
    pub fn pop_last(&mut self) -> Option<ChatMessage> {
        if self.messages.len() > 1 {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Remove the oldest question and, if present, its answer.
    pub fn delete_first(&mut self) -> Option<DeletedExchange> {
        if self.messages.len() < 3 {
            return None;
        }
        let before = self.approx_tokens();
        let question = self.messages.remove(1);
        if self.messages.get(1).map(|m| m.role) == Some(Role::Assistant) {
            self.messages.remove(1);
        }

        Some(DeletedExchange {
            question: first_line(&question.content),
            tokens_saved: before.saturating_sub(self.approx_tokens()),
        })
    }

    /// Remove the newest exchange: the last answer and the question before it.
    /// Returns the question's first line.
    pub fn undo(&mut self) -> Option<String> {
        let mut removed = self.pop_last()?;
        if removed.role == Role::Assistant {
            if let Some(question) = self.pop_last() {
                removed = question;
            }
        }
        Some(first_line(&removed.content))
    }

    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map_or("", |m| m.content.as_str())
    }

    /// Replace the system prompt, returning the old one.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) -> String {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => std::mem::replace(&mut first.content, prompt.into()),
            _ => {
                self.messages.insert(0, ChatMessage::system(prompt));
                String::new()
            }
        }
    }

    /// Drop every turn, keeping the system prompt.
    pub fn delete_all(&mut self) {
        self.messages.truncate(1);
    }

    /// Approximate prompt size of the whole history.
    pub fn approx_tokens(&self) -> usize {
        self.messages.iter().map(message_tokens).sum()
    }

    /// Write the history as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.messages).map_err(|source| {
            StoreError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "chat history saved");
        Ok(())
    }

    /// Write a timestamped backup into `dir`, returning its path.
    pub fn save_urgent(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let stamp = Local::now().format("%Y-%m-%d_%H,%M,%S");
        let path = dir.join(format!("chat_history_backup_{stamp}.json"));
        self.save(&path)?;
        tracing::warn!(path = %path.display(), "emergency chat history backup written");
        Ok(path)
    }

    /// Load a history previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let messages: Vec<ChatMessage> =
            serde_json::from_str(&contents).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), count = messages.len(), "chat history loaded");
        Ok(Self::from_messages(messages))
    }
}

/// Default file name for `/save` without an argument.
pub fn default_save_name(title: Option<&str>) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => {
            let safe: String = title
                .chars()
                .map(|c| match c {
                    '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                    c => c,
                })
                .collect();
            format!("{safe}.json")
        }
        None => format!("chat_history_{}.json", Local::now().format("%Y-%m-%d_%H,%M,%S")),
    }
}
