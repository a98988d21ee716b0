//! Interactive loop: read a line, run a command or a chat turn, repeat.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use gt_protocol::Role;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::chat::{ChatBackend, ChatSession, TurnStatus};
use crate::config::supports_thinking_budget;
use crate::conversation::default_save_name;
use crate::renderer::{Overflow, TerminalRenderer};
use crate::style::{format_tokens, Tone};
use crate::title::set_window_title;

/// Messages that end the session once they have been answered.
const FAREWELLS: &[&str] = &["bye", "exit", "quit", "goodbye", "end"];

/// Budget used when thinking is switched on without one.
const DEFAULT_THINKING_BUDGET: u32 = 2048;

/// Slash commands available at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Raw,
    Stream,
    Model(Option<String>),
    Save(Option<String>),
    DeleteFirst,
    DeleteAll,
    Undo,
    Last,
    Tokens,
    System(Option<String>),
    Temperature(Option<String>),
    Timeout(Option<String>),
    Thinking(Option<String>),
    Title,
    Overflow(Option<String>),
    Help,
    Exit,
    Unknown(String),
}

/// Parse a prompt line as a slash command. `None` if it is a chat message.
pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (trimmed, None),
    };
    let arg = arg.map(str::to_string);

    let command = match cmd.to_lowercase().as_str() {
        "/raw" => Command::Raw,
        "/stream" => Command::Stream,
        "/model" => Command::Model(arg),
        "/save" => Command::Save(arg),
        "/delete" => match arg.as_deref() {
            Some("all") => Command::DeleteAll,
            None | Some("first") => Command::DeleteFirst,
            Some(other) => Command::Unknown(format!("/delete {other}")),
        },
        "/undo" => Command::Undo,
        "/last" => Command::Last,
        "/tokens" => Command::Tokens,
        "/system" => Command::System(arg),
        "/temperature" | "/rand" => Command::Temperature(arg),
        "/timeout" => Command::Timeout(arg),
        "/thinking" => Command::Thinking(arg),
        "/title" => Command::Title,
        "/overflow" => Command::Overflow(arg),
        "/help" => Command::Help,
        "/exit" | "/quit" => Command::Exit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Whether `message` is a farewell that ends the session.
pub fn is_farewell(message: &str) -> bool {
    let word = message
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    FAREWELLS.contains(&word.as_str())
}

/// What the loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Send on `cancel` when Ctrl+C is pressed, until aborted.
fn spawn_interrupt_watcher(cancel: oneshot::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("reply interrupted by user");
            let _ = cancel.send(());
        }
    })
}

/// Run a chat turn with Ctrl+C wired to cancellation.
pub async fn run_turn<B: ChatBackend, W: Write>(
    chat: &mut ChatSession<B>,
    renderer: &mut TerminalRenderer<W>,
    message: &str,
) -> TurnStatus {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let watcher = spawn_interrupt_watcher(cancel_tx);
    let status = chat.handle(message, renderer, cancel_rx).await;
    watcher.abort();
    status
}

/// Execute one slash command.
pub async fn execute_command<B: ChatBackend, W: Write>(
    command: Command,
    chat: &mut ChatSession<B>,
    renderer: &mut TerminalRenderer<W>,
) -> Flow {
    match command {
        Command::Raw => {
            let settings = chat.settings_mut();
            settings.raw = !settings.raw;
            let state = if settings.raw { "enabled" } else { "disabled" };
            renderer.emit_success(&format!("Raw mode {state}"));
        }
        Command::Stream => {
            let settings = chat.settings_mut();
            settings.stream = !settings.stream;
            let state = if settings.stream { "enabled" } else { "disabled" };
            renderer.emit_success(&format!("Stream mode {state}"));
        }
        Command::Model(None) => {
            renderer.emit_notice(&format!("Current model: {}", chat.settings().model));
        }
        Command::Model(Some(model)) => {
            let settings = chat.settings_mut();
            let old = std::mem::replace(&mut settings.model, model);
            tracing::info!(from = %old, to = %settings.model, "model changed");
            let limit = settings
                .tokens_limit()
                .map_or_else(|| "unknown".to_string(), |l| l.to_string());
            renderer.emit_success(&format!(
                "Model changed from {old} to {} (context limit: {limit})",
                settings.model
            ));
        }
        Command::Save(file) => {
            let path = match file {
                Some(file) => PathBuf::from(file),
                None => {
                    let title = chat.titles().and_then(|t| t.title());
                    chat.settings().save_dir.join(default_save_name(title.as_deref()))
                }
            };
            match chat.store().save(&path) {
                Ok(()) => renderer.emit_success(&format!("Chat history saved to {}", path.display())),
                Err(e) => {
                    renderer.emit_error(&e.to_string());
                    chat.backup(renderer);
                }
            }
        }
        Command::DeleteFirst => match chat.store_mut().delete_first() {
            Some(deleted) => renderer.emit_success(&format!(
                "Deleted \"{}\" ({} tokens freed)",
                deleted.question, deleted.tokens_saved
            )),
            None => renderer.emit_notice("Nothing to delete."),
        },
        Command::DeleteAll => {
            chat.store_mut().delete_all();
            if let Some(titles) = chat.titles() {
                titles.clear();
            }
            renderer.emit_success("Conversation cleared.");
        }
        Command::Undo => match chat.store_mut().undo() {
            Some(question) => renderer.emit_success(&format!("Removed \"{question}\"")),
            None => renderer.emit_notice("Nothing to undo."),
        },
        Command::Last => match chat.store().last().filter(|m| m.role != Role::System) {
            Some(message) => renderer.emit_message(message),
            None => renderer.emit_notice("No messages yet."),
        },
        Command::Tokens => {
            let limit = chat
                .settings()
                .tokens_limit()
                .map_or_else(|| "unknown".to_string(), format_tokens);
            renderer.emit_notice(&format!(
                "Total tokens spent: {}",
                format_tokens(chat.total_tokens())
            ));
            renderer.emit_notice(&format!(
                "Current conversation: {} / {limit}",
                format_tokens(chat.store().approx_tokens())
            ));
        }
        Command::System(None) => {
            renderer.emit_notice(&format!("System prompt: {}", chat.store().system_prompt()));
        }
        Command::System(Some(prompt)) => {
            let old = chat.store_mut().set_system_prompt(prompt.as_str());
            tracing::info!(from = %old, to = %prompt, "system prompt changed");
            renderer.emit_success(&format!("System prompt changed from \"{old}\" to \"{prompt}\""));
            if !chat.store().is_empty() {
                renderer.emit_notice("Earlier replies were written under the old prompt.");
            }
        }
        Command::Temperature(None) => {
            renderer.emit_notice(&format!("Temperature: {}", chat.settings().temperature));
        }
        Command::Temperature(Some(value)) => match value.parse::<f32>() {
            Ok(t) if (0.0..=1.0).contains(&t) => {
                chat.settings_mut().temperature = t;
                renderer.emit_success(&format!("Temperature set to {t}"));
            }
            _ => renderer.emit_error("temperature must be a number between 0 and 1"),
        },
        Command::Timeout(None) => renderer.emit_warning("Usage: /timeout <seconds>"),
        Command::Timeout(Some(value)) => match value.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs > 0.0 => {
                match chat.set_timeout(Duration::from_secs_f64(secs)) {
                    Ok(()) => renderer.emit_success(&format!("Request timeout set to {secs}s")),
                    Err(e) => renderer.emit_error(&e.to_string()),
                }
            }
            _ => renderer.emit_error("timeout must be a positive number of seconds"),
        },
        Command::Thinking(arg) => set_thinking(chat, renderer, arg.as_deref()),
        Command::Title => show_title(chat, renderer).await,
        Command::Overflow(None) => {
            renderer.emit_notice(&format!("Overflow mode: {}", renderer.overflow()));
        }
        Command::Overflow(Some(mode)) => match mode.parse::<Overflow>() {
            Ok(overflow) => {
                renderer.set_overflow(overflow);
                renderer.emit_success(&format!("Overflow mode set to {overflow}"));
            }
            Err(e) => renderer.emit_error(&e),
        },
        Command::Help => print_help(renderer),
        Command::Exit => return Flow::Exit,
        Command::Unknown(cmd) => {
            renderer.emit_warning(&format!("Unrecognized command: {cmd} (try /help)"));
        }
    }
    Flow::Continue
}

/// `/thinking [budget|off]`: with no argument, toggle.
fn set_thinking<B: ChatBackend, W: Write>(
    chat: &mut ChatSession<B>,
    renderer: &mut TerminalRenderer<W>,
    arg: Option<&str>,
) {
    if !supports_thinking_budget(&chat.settings().model) {
        renderer.emit_warning(&format!(
            "Thinking budgets are not supported by {} (Claude 3.7 Sonnet, Sonnet 4 and Opus 4 only)",
            chat.settings().model
        ));
        return;
    }

    let settings = chat.settings_mut();
    settings.thinking_budget = match arg {
        None => match settings.thinking_budget {
            Some(_) => None,
            None => Some(DEFAULT_THINKING_BUDGET),
        },
        Some(arg) => match arg.parse::<u32>() {
            Ok(budget) => Some(budget),
            Err(_) if matches!(arg.to_lowercase().as_str(), "off" | "disable" | "disabled" | "false" | "no") => None,
            Err(_) => Some(DEFAULT_THINKING_BUDGET),
        },
    };
    match settings.thinking_budget {
        Some(budget) => renderer.emit_success(&format!("Thinking enabled with a budget of {budget} tokens")),
        None => renderer.emit_warning("Thinking disabled"),
    }
}

async fn show_title<B: ChatBackend, W: Write>(
    chat: &ChatSession<B>,
    renderer: &mut TerminalRenderer<W>,
) {
    let Some(question) = chat.store().first_question().map(str::to_string) else {
        renderer.emit_notice("No conversation yet, nothing to title.");
        return;
    };
    let Some(titles) = chat.titles() else {
        renderer.emit_notice("Title generation is not available.");
        return;
    };

    titles.wait_idle().await;
    if titles.title().is_none() {
        titles.request(&question);
        titles.wait_idle().await;
    }
    match titles.title() {
        Some(title) => {
            set_window_title(&title);
            renderer.emit_success(&format!("Title: {title}"));
        }
        None => renderer.emit_error("title generation failed (see chat.log)"),
    }
}

fn print_help<W: Write>(renderer: &mut TerminalRenderer<W>) {
    let style = *renderer.style();
    let rows = [
        ("/raw", "Toggle raw output (no redraw)"),
        ("/stream", "Toggle streaming replies"),
        ("/model [name]", "Show or change the model"),
        ("/save [file]", "Save the conversation as JSON"),
        ("/delete [all]", "Delete the first exchange, or everything"),
        ("/undo", "Remove the last question and its answer"),
        ("/last", "Print the last message again"),
        ("/tokens", "Show token usage"),
        ("/system [prompt]", "Show or replace the system prompt"),
        ("/temperature [t]", "Show or set the temperature (0 to 1)"),
        ("/timeout <secs>", "Set the request timeout"),
        ("/thinking [n|off]", "Toggle or size the thinking budget"),
        ("/title", "Show the conversation title"),
        ("/overflow [mode]", "ellipsis, crop or visible"),
        ("/exit", "End the session"),
    ];
    for (cmd, help) in rows {
        let cmd = style.paint(Tone::BoldCyan, &format!("{cmd:<18}"));
        let _ = writeln!(renderer.writer, "  {cmd}{help}");
    }
    let _ = renderer.writer.flush();
}

/// Read lines from `input` until EOF, `/exit`, a farewell or Ctrl+C.
pub async fn run_repl<B, W, R>(
    chat: &mut ChatSession<B>,
    renderer: &mut TerminalRenderer<W>,
    input: R,
) -> std::io::Result<()>
where
    B: ChatBackend,
    W: Write,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let style = *renderer.style();
        let _ = write!(renderer.writer, "{}", style.paint(Tone::Green, "> "));
        let _ = renderer.writer.flush();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            let _ = writeln!(renderer.writer);
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = parse_command(line) {
            if execute_command(command, chat, renderer).await == Flow::Exit {
                break;
            }
            continue;
        }

        run_turn(chat, renderer, line).await;
        if is_farewell(line) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SessionSettings;
    use crate::config::ChatConfig;
    use crate::conversation::ConversationStore;
    use crate::style::Style;
    use gt_backend::mock::{fixtures, mock_events};
    use gt_backend::{ChatError, EventStream};
    use gt_protocol::ChatRequest;
    use serde_json::Value;
    use std::future::Future;
    use std::sync::Mutex;

    /// Streams the same canned reply for every request.
    struct Echo {
        reply: &'static str,
        calls: Mutex<usize>,
        timeout: Option<Duration>,
    }

    impl ChatBackend for Echo {
        fn stream_chat(
            &self,
            _request: &ChatRequest,
        ) -> impl Future<Output = Result<EventStream, ChatError>> + Send {
            *self.calls.lock().unwrap() += 1;
            let events = mock_events(fixtures::streaming_text(&[self.reply]));
            async move { Ok(events) }
        }

        fn complete(
            &self,
            _request: &ChatRequest,
        ) -> impl Future<Output = Result<Value, ChatError>> + Send {
            async { Err(ChatError::Timeout(Duration::from_secs(1))) }
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<(), ChatError> {
            self.timeout = Some(timeout);
            Ok(())
        }
    }

    fn session(dir: &std::path::Path) -> ChatSession<Echo> {
        let settings = SessionSettings {
            save_dir: dir.to_path_buf(),
            ..SessionSettings::from_config(&ChatConfig::default())
        };
        ChatSession::new(
            Echo {
                reply: "pong",
                calls: Mutex::new(0),
                timeout: None,
            },
            ConversationStore::with_system_prompt("sys"),
            settings,
            None,
        )
    }

    fn renderer() -> TerminalRenderer<Vec<u8>> {
        TerminalRenderer::with_size(Vec::new(), Style::disabled(), 80, 24)
    }

    fn output(r: &TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8_lossy(&r.writer).to_string()
    }

    #[test]
    fn parse_basic_commands() {
        assert_eq!(parse_command("/raw"), Some(Command::Raw));
        assert_eq!(parse_command("  /STREAM "), Some(Command::Stream));
        assert_eq!(parse_command("/exit"), Some(Command::Exit));
        assert_eq!(parse_command("/title"), Some(Command::Title));
        assert_eq!(parse_command("hello"), None);
    }

    #[test]
    fn parse_commands_with_arguments() {
        assert_eq!(parse_command("/model"), Some(Command::Model(None)));
        assert_eq!(
            parse_command("/model gpt-4o"),
            Some(Command::Model(Some("gpt-4o".to_string())))
        );
        assert_eq!(
            parse_command("/save  notes.json "),
            Some(Command::Save(Some("notes.json".to_string())))
        );
        assert_eq!(
            parse_command("/overflow crop"),
            Some(Command::Overflow(Some("crop".to_string())))
        );
    }

    #[test]
    fn parse_delete_variants() {
        assert_eq!(parse_command("/delete"), Some(Command::DeleteFirst));
        assert_eq!(parse_command("/delete first"), Some(Command::DeleteFirst));
        assert_eq!(parse_command("/delete all"), Some(Command::DeleteAll));
        assert!(matches!(parse_command("/delete some"), Some(Command::Unknown(_))));
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_command("/frobnicate"),
            Some(Command::Unknown("/frobnicate".to_string()))
        );
    }

    #[test]
    fn parse_history_and_setting_commands() {
        assert_eq!(parse_command("/undo"), Some(Command::Undo));
        assert_eq!(parse_command("/last"), Some(Command::Last));
        assert_eq!(parse_command("/tokens"), Some(Command::Tokens));
        assert_eq!(
            parse_command("/system You are a pirate."),
            Some(Command::System(Some("You are a pirate.".to_string())))
        );
        assert_eq!(
            parse_command("/rand 0.2"),
            Some(Command::Temperature(Some("0.2".to_string())))
        );
        assert_eq!(parse_command("/temperature"), Some(Command::Temperature(None)));
        assert_eq!(
            parse_command("/timeout 60"),
            Some(Command::Timeout(Some("60".to_string())))
        );
        assert_eq!(parse_command("/thinking off"), Some(Command::Thinking(Some("off".to_string()))));
    }

    #[test]
    fn farewells() {
        assert!(is_farewell("bye"));
        assert!(is_farewell("Goodbye!"));
        assert!(is_farewell(" quit "));
        assert!(!is_farewell("bye for now"));
        assert!(!is_farewell("hello"));
    }

    #[tokio::test]
    async fn toggles_and_model_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();

        execute_command(Command::Raw, &mut chat, &mut r).await;
        assert!(chat.settings().raw);
        execute_command(Command::Stream, &mut chat, &mut r).await;
        assert!(!chat.settings().stream);
        execute_command(Command::Model(Some("gpt-4o".into())), &mut chat, &mut r).await;
        assert_eq!(chat.settings().model, "gpt-4o");

        let out = output(&r);
        assert!(out.contains("Raw mode enabled"));
        assert!(out.contains("Stream mode disabled"));
        assert!(out.contains("Model changed from gpt-3.5-turbo to gpt-4o (context limit: 128000)"));
    }

    #[tokio::test]
    async fn undo_and_last() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        run_turn(&mut chat, &mut r, "ping").await;

        execute_command(Command::Last, &mut chat, &mut r).await;
        assert!(output(&r).ends_with("AI: pong\n"));

        execute_command(Command::Undo, &mut chat, &mut r).await;
        assert!(chat.store().is_empty());
        assert!(output(&r).contains("Removed \"ping\""));

        execute_command(Command::Undo, &mut chat, &mut r).await;
        assert!(output(&r).contains("Nothing to undo."));
    }

    #[tokio::test]
    async fn tokens_report_usage_against_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        execute_command(Command::Tokens, &mut chat, &mut r).await;

        let out = output(&r);
        assert!(out.contains("Total tokens spent: 0"));
        assert!(out.contains(&format!("Current conversation: {} / 4.1k", chat.store().approx_tokens())));
    }

    #[tokio::test]
    async fn system_prompt_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        execute_command(Command::System(Some("be terse".into())), &mut chat, &mut r).await;
        assert_eq!(chat.store().system_prompt(), "be terse");
        assert!(output(&r).contains("from \"sys\" to \"be terse\""));
    }

    #[tokio::test]
    async fn temperature_is_range_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();

        execute_command(Command::Temperature(Some("0.3".into())), &mut chat, &mut r).await;
        assert_eq!(chat.settings().temperature, 0.3);

        execute_command(Command::Temperature(Some("1.5".into())), &mut chat, &mut r).await;
        execute_command(Command::Temperature(Some("warm".into())), &mut chat, &mut r).await;
        assert_eq!(chat.settings().temperature, 0.3);
        assert_eq!(output(&r).matches("between 0 and 1").count(), 2);
    }

    #[tokio::test]
    async fn timeout_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();

        execute_command(Command::Timeout(Some("45".into())), &mut chat, &mut r).await;
        assert_eq!(chat.backend().timeout, Some(Duration::from_secs(45)));

        execute_command(Command::Timeout(Some("-1".into())), &mut chat, &mut r).await;
        assert_eq!(chat.backend().timeout, Some(Duration::from_secs(45)));
        assert!(output(&r).contains("positive number of seconds"));
    }

    #[tokio::test]
    async fn thinking_budget_toggle_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();

        execute_command(Command::Thinking(None), &mut chat, &mut r).await;
        assert_eq!(chat.settings().thinking_budget, None);
        assert!(output(&r).contains("not supported by gpt-3.5-turbo"));

        chat.settings_mut().model = "bedrock/anthropic.claude-3-7-sonnet".to_string();
        execute_command(Command::Thinking(None), &mut chat, &mut r).await;
        assert_eq!(chat.settings().thinking_budget, Some(2048));
        execute_command(Command::Thinking(Some("8000".into())), &mut chat, &mut r).await;
        assert_eq!(chat.settings().thinking_budget, Some(8000));
        execute_command(Command::Thinking(Some("off".into())), &mut chat, &mut r).await;
        assert_eq!(chat.settings().thinking_budget, None);
        execute_command(Command::Thinking(None), &mut chat, &mut r).await;
        execute_command(Command::Thinking(None), &mut chat, &mut r).await;
        assert_eq!(chat.settings().thinking_budget, None);
    }

    #[tokio::test]
    async fn overflow_command_updates_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();

        execute_command(Command::Overflow(Some("visible".into())), &mut chat, &mut r).await;
        assert_eq!(r.overflow(), Overflow::Visible);

        execute_command(Command::Overflow(Some("sideways".into())), &mut chat, &mut r).await;
        assert_eq!(r.overflow(), Overflow::Visible);
        assert!(output(&r).contains("unknown overflow mode"));
    }

    #[tokio::test]
    async fn save_without_name_uses_save_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        chat.store_mut().push_user("q");
        let mut r = renderer();

        execute_command(Command::Save(None), &mut chat, &mut r).await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(output(&r).contains("Chat history saved to"));
    }

    #[tokio::test]
    async fn title_without_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        execute_command(Command::Title, &mut chat, &mut r).await;
        assert!(output(&r).contains("nothing to title"));
    }

    #[tokio::test]
    async fn repl_runs_turns_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        let input: &[u8] = b"hello\n\n/delete\nagain\n/exit\nnever sent\n";

        run_repl(&mut chat, &mut r, input).await.unwrap();

        assert_eq!(*chat.backend().calls.lock().unwrap(), 2);
        let messages = chat.store().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "again");
        assert_eq!(messages[2].content, "pong");
    }

    #[tokio::test]
    async fn repl_ends_after_answering_farewell() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        let input: &[u8] = b"bye\nstill here?\n";

        run_repl(&mut chat, &mut r, input).await.unwrap();

        assert_eq!(chat.store().len(), 3);
        assert_eq!(chat.store().last().unwrap().content, "pong");
    }

    #[tokio::test]
    async fn repl_stops_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session(dir.path());
        let mut r = renderer();
        run_repl(&mut chat, &mut r, &b""[..]).await.unwrap();
        assert!(chat.store().is_empty());
    }
}
