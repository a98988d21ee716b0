//! Background conversation titles.
//!
//! After the first exchange is stored, the first question is sent to a
//! worker task that asks the model for a short title. The worker only ever
//! sees the copy it was sent, so it never races with the conversation.
//! Failures are logged and leave the title unset.

use std::future::Future;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossterm::execute;
use crossterm::terminal::SetTitle;
use gt_backend::{completion_text, ChatClient};
use gt_protocol::{ChatMessage, ChatRequest};
use tokio::sync::{mpsc, watch};

use crate::conversation::approx_tokens;

const TITLE_TEMPERATURE: f32 = 0.5;

/// Prompt asking for a title of `content`.
pub fn title_prompt(content: &str) -> String {
    format!(
        "Generate title shorter than 10 words for the following content in content's language. \
         The title contains ONLY words. DO NOT include line-break. \n\nContent: \"\"\"\n{content}\n\"\"\""
    )
}

/// Normalize a model reply into a one-line title.
pub fn clean_title(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("Title:").unwrap_or(line).trim();
    let line = line
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '*' | '#'))
        .trim_end_matches('.')
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Ask `model` for a title of `content`. Returns the title and the tokens spent.
pub async fn fetch_title(client: &ChatClient, model: &str, content: &str) -> Option<(String, usize)> {
    let prompt = title_prompt(content);
    let request = ChatRequest::new(model, vec![ChatMessage::user(prompt.clone())])
        .with_temperature(TITLE_TEMPERATURE);

    match client.complete(&request).await {
        Ok(response) => {
            let text = completion_text(&response).unwrap_or_default();
            let title = clean_title(text)?;
            Some((title, approx_tokens(&prompt) + approx_tokens(text)))
        }
        Err(e) => {
            tracing::error!(error = %e, "title generation failed");
            None
        }
    }
}

/// Handle to the title worker.
pub struct TitleGenerator {
    jobs: mpsc::UnboundedSender<String>,
    title: Arc<Mutex<Option<String>>>,
    pending: Arc<watch::Sender<usize>>,
    tokens_spent: Arc<AtomicUsize>,
}

impl TitleGenerator {
    /// Spawn a worker backed by `client`.
    pub fn spawn(client: ChatClient, model: String, set_terminal_title: bool) -> Self {
        let tokens = Arc::new(AtomicUsize::new(0));
        let worker_tokens = Arc::clone(&tokens);
        Self::spawn_with(
            move |content: String| {
                let client = client.clone();
                let model = model.clone();
                let tokens = Arc::clone(&worker_tokens);
                async move {
                    let (title, spent) = fetch_title(&client, &model, &content).await?;
                    tokens.fetch_add(spent, Ordering::Relaxed);
                    Some(title)
                }
            },
            set_terminal_title,
            tokens,
        )
    }

    /// Spawn a worker that obtains titles from `fetch`.
    pub fn spawn_with<F, Fut>(fetch: F, set_terminal_title: bool, tokens_spent: Arc<AtomicUsize>) -> Self
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let (jobs, mut rx) = mpsc::unbounded_channel::<String>();
        let title = Arc::new(Mutex::new(None));
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);

        let worker_title = Arc::clone(&title);
        let worker_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(content) = rx.recv().await {
                tracing::debug!(len = content.len(), "generating title");
                let generated = fetch(content).await;
                match &generated {
                    Some(new_title) => {
                        tracing::info!(title = %new_title, "title generated");
                        if set_terminal_title {
                            set_window_title(new_title);
                        }
                    }
                    None => tracing::warn!("no title generated"),
                }
                if let Ok(mut slot) = worker_title.lock() {
                    *slot = generated;
                }
                worker_pending.send_modify(|n| *n = n.saturating_sub(1));
            }
        });

        Self {
            jobs,
            title,
            pending,
            tokens_spent,
        }
    }

    /// Queue a title request for `first_question`.
    pub fn request(&self, first_question: &str) {
        self.pending.send_modify(|n| *n += 1);
        if self.jobs.send(first_question.to_string()).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            tracing::warn!("title worker stopped; request dropped");
        }
    }

    /// Wait until every queued request has been handled.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn is_busy(&self) -> bool {
        *self.pending.borrow() > 0
    }

    pub fn title(&self) -> Option<String> {
        self.title.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.title.lock() {
            *slot = None;
        }
    }

    /// Tokens used by title requests so far.
    pub fn tokens_spent(&self) -> usize {
        self.tokens_spent.load(Ordering::Relaxed)
    }
}

/// Set the terminal window title, if stdout is a terminal.
pub fn set_window_title(title: &str) {
    let mut stdout = io::stdout();
    if stdout.is_terminal() {
        let _ = execute!(stdout, SetTitle(title));
    }
}
