//! One chat turn: request, stream processing, persistence.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use gt_backend::{ChatClient, ChatError, EventStream};
use gt_protocol::{ChatRequest, ThinkingConfig};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::{requires_max_tokens, supports_thinking_budget, tokens_limit_for, ChatConfig};
use crate::conversation::ConversationStore;
use crate::delta::DeltaExtractor;
use crate::renderer::{RenderMode, TerminalRenderer};
use crate::stream::{assemble_completion, process_stream, StreamStatus};
use crate::style::format_tokens;
use crate::title::TitleGenerator;

/// Remaining-context threshold below which the user is warned.
const TOKENS_WARNING_MARGIN: usize = 500;

/// Transport used by a [`ChatSession`].
pub trait ChatBackend {
    fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<EventStream, ChatError>> + Send;

    fn complete(&self, request: &ChatRequest) -> impl Future<Output = Result<Value, ChatError>> + Send;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ChatError>;
}

impl ChatBackend for ChatClient {
    fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<EventStream, ChatError>> + Send {
        ChatClient::stream_chat(self, request)
    }

    fn complete(&self, request: &ChatRequest) -> impl Future<Output = Result<Value, ChatError>> + Send {
        ChatClient::complete(self, request)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ChatError> {
        ChatClient::set_timeout(self, timeout)
    }
}

/// Per-session chat settings, seeded from `[chat]` and changed by commands.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    pub stream: bool,
    pub raw: bool,
    pub auto_generate_title: bool,
    pub reasoning_markers: Vec<String>,
    pub thinking_budget: Option<u32>,
    pub max_tokens: u32,
    pub tokens_limit: Option<usize>,
    pub save_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(chat: &ChatConfig) -> Self {
        Self {
            model: chat.model.clone(),
            temperature: chat.temperature,
            stream: chat.stream,
            raw: chat.raw,
            auto_generate_title: chat.auto_generate_title,
            reasoning_markers: chat.reasoning_markers.clone(),
            thinking_budget: chat.thinking_budget,
            max_tokens: chat.max_tokens,
            tokens_limit: chat.tokens_limit,
            save_dir: chat.resolve_save_dir(),
        }
    }

    /// Context window for the current model.
    pub fn tokens_limit(&self) -> Option<usize> {
        self.tokens_limit.or_else(|| tokens_limit_for(&self.model))
    }

    pub fn render_mode(&self) -> RenderMode {
        RenderMode::from_raw(self.raw)
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    /// The reply arrived in full and was stored.
    Completed,
    /// The user cancelled. A partial reply is stored; if none had arrived,
    /// the user turn was withdrawn.
    Interrupted,
    /// The connection broke mid-reply; the partial reply was stored.
    Incomplete,
    /// Nothing was stored; the user turn was withdrawn.
    Failed,
}

/// Await `request` unless `cancel` fires first (`None`). A dropped sender
/// lets the request finish and leaves `cancel` closed.
async fn race_cancel<F: Future>(request: F, cancel: &mut oneshot::Receiver<()>) -> Option<F::Output> {
    tokio::pin!(request);
    tokio::select! {
        biased;
        signal = &mut *cancel => match signal {
            Ok(()) => None,
            Err(_) => {
                // A completed receiver must not be polled again.
                let (_, closed) = oneshot::channel();
                *cancel = closed;
                Some(request.await)
            }
        },
        output = &mut request => Some(output),
    }
}

/// A conversation bound to a backend.
pub struct ChatSession<B: ChatBackend = ChatClient> {
    backend: B,
    store: ConversationStore,
    settings: SessionSettings,
    titles: Option<TitleGenerator>,
    total_tokens: usize,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(
        backend: B,
        store: ConversationStore,
        settings: SessionSettings,
        titles: Option<TitleGenerator>,
    ) -> Self {
        Self {
            backend,
            store,
            settings,
            titles,
            total_tokens: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), ChatError> {
        self.backend.set_timeout(timeout)?;
        tracing::info!(?timeout, "request timeout changed");
        Ok(())
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    pub fn titles(&self) -> Option<&TitleGenerator> {
        self.titles.as_ref()
    }

    /// Tokens sent and received this session, title requests included.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens + self.titles.as_ref().map_or(0, TitleGenerator::tokens_spent)
    }

    fn extractor(&self) -> DeltaExtractor {
        DeltaExtractor::for_model(&self.settings.model, &self.settings.reasoning_markers)
    }

    fn build_request(&self) -> ChatRequest {
        let model = &self.settings.model;
        let thinking = self
            .settings
            .thinking_budget
            .filter(|_| supports_thinking_budget(model))
            .map(ThinkingConfig::enabled);
        let max_tokens = requires_max_tokens(model).then_some(self.settings.max_tokens);

        ChatRequest::new(model.clone(), self.store.messages().to_vec())
            .with_temperature(self.settings.temperature)
            .with_max_tokens(max_tokens)
            .with_thinking(thinking)
    }

    /// Send `text` and present the reply. `cancel` interrupts a streamed reply.
    pub async fn handle<W: Write>(
        &mut self,
        text: &str,
        renderer: &mut TerminalRenderer<W>,
        mut cancel: oneshot::Receiver<()>,
    ) -> TurnStatus {
        self.store.push_user(text);
        tracing::info!(model = %self.settings.model, len = text.len(), "user message");

        let (message, status) = if self.settings.stream {
            let request = self.build_request();
            let events = match race_cancel(self.backend.stream_chat(&request), &mut cancel).await {
                Some(Ok(events)) => events,
                Some(Err(e)) => return self.withdraw_turn(&e, renderer),
                None => return self.abandon_turn(renderer),
            };

            renderer.emit_reply_label();
            let outcome = process_stream(
                events,
                &self.extractor(),
                renderer,
                self.settings.render_mode(),
                cancel,
            )
            .await;
            if outcome.decode_errors > 0 {
                tracing::warn!(count = outcome.decode_errors, "malformed frames skipped");
            }

            let status = match outcome.status {
                StreamStatus::Completed => TurnStatus::Completed,
                StreamStatus::Interrupted => {
                    renderer.emit_cancelled();
                    TurnStatus::Interrupted
                }
                StreamStatus::Failed(reason) => {
                    renderer.emit_error(&format!("reply incomplete: {reason}"));
                    TurnStatus::Incomplete
                }
            };
            (outcome.message, status)
        } else {
            let request = self.build_request();
            let response = match race_cancel(self.backend.complete(&request), &mut cancel).await {
                Some(Ok(response)) => response,
                Some(Err(e)) => return self.withdraw_turn(&e, renderer),
                None => return self.abandon_turn(renderer),
            };
            let message = assemble_completion(&response, &self.extractor());
            renderer.emit_message(&message.clone().into_chat_message());
            (message, TurnStatus::Completed)
        };

        if message.is_empty() {
            tracing::warn!(?status, "empty reply; user turn withdrawn");
            self.store.pop_last();
            return match status {
                TurnStatus::Interrupted => TurnStatus::Interrupted,
                _ => TurnStatus::Failed,
            };
        }

        tracing::info!(len = message.content.len(), ?status, "assistant reply");
        self.store.append(message.into_chat_message());
        let current = self.store.approx_tokens();
        self.total_tokens += current;

        if self.store.is_first_exchange() && self.settings.auto_generate_title {
            if let (Some(titles), Some(question)) = (&self.titles, self.store.first_question()) {
                titles.request(question);
            }
        }

        if let Some(limit) = self.settings.tokens_limit() {
            let left = limit.saturating_sub(current);
            if (1..TOKENS_WARNING_MARGIN).contains(&left) {
                renderer.emit_warning(&format!(
                    "Approaching the context limit: {} tokens left. Use /delete to free some.",
                    format_tokens(left)
                ));
            }
        }

        if status == TurnStatus::Incomplete {
            self.backup(renderer);
        }
        status
    }

    /// Answer `text` without streaming and return the plain reply (pipe mode).
    pub async fn handle_simple(&mut self, text: &str) -> Result<String, ChatError> {
        self.store.push_user(text);
        let request = self.build_request();
        let response = match self.backend.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.store.pop_last();
                tracing::error!(error = %e, "request failed");
                return Err(e);
            }
        };
        let message = assemble_completion(&response, &self.extractor());
        let content = message.content.clone();
        self.store.append(message.into_chat_message());
        self.total_tokens += self.store.approx_tokens();
        Ok(content)
    }

    /// The user cancelled before any reply arrived.
    fn abandon_turn<W: Write>(&mut self, renderer: &mut TerminalRenderer<W>) -> TurnStatus {
        self.store.pop_last();
        tracing::info!("request cancelled before a reply arrived");
        renderer.emit_cancelled();
        TurnStatus::Interrupted
    }

    fn withdraw_turn<W: Write>(&mut self, error: &ChatError, renderer: &mut TerminalRenderer<W>) -> TurnStatus {
        self.store.pop_last();
        tracing::error!(error = %error, "chat request failed");
        renderer.emit_error(&error.to_string());

        if matches!(error, ChatError::Json(_)) {
            self.backup(renderer);
        }
        if let Some(limit) = self.settings.tokens_limit() {
            if self.store.approx_tokens() >= limit {
                renderer.emit_warning("The conversation has reached the model's context limit. Use /delete to free some.");
            }
        }
        TurnStatus::Failed
    }

    /// Write an emergency backup of the conversation.
    pub fn backup<W: Write>(&self, renderer: &mut TerminalRenderer<W>) -> Option<PathBuf> {
        match self.store.save_urgent(&self.settings.save_dir) {
            Ok(path) => {
                renderer.emit_notice(&format!("Chat history backed up to {}", path.display()));
                Some(path)
            }
            Err(e) => {
                tracing::error!(error = %e, "emergency backup failed");
                renderer.emit_error(&e.to_string());
                None
            }
        }
    }
}
