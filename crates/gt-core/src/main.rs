use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gt_backend::ChatClient;
use gt_core::chat::{ChatSession, SessionSettings, TurnStatus};
use gt_core::config::Config;
use gt_core::conversation::ConversationStore;
use gt_core::logging;
use gt_core::renderer::TerminalRenderer;
use gt_core::repl::{run_repl, run_turn};
use gt_core::style::Style;
use gt_core::title::{set_window_title, TitleGenerator};

/// Chat with OpenAI-compatible models in the terminal.
#[derive(Parser, Debug)]
#[command(name = "gpt-term", author, version, about, long_about = None)]
struct Args {
    /// Load a chat history file.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// API key (overrides the config file and OPENAI_API_KEY).
    #[arg(long, env = "GPT_TERM_API_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Model to use.
    #[arg(long)]
    model: Option<String>,

    /// API host, e.g. http://localhost:4000
    #[arg(long)]
    host: Option<String>,

    /// Print replies verbatim instead of redrawing them.
    #[arg(short, long)]
    raw: bool,

    /// Disable streaming.
    #[arg(long)]
    no_stream: bool,

    /// List the models offered by the host and exit.
    #[arg(long)]
    list_models: bool,

    /// Ask a single question and exit.
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("[gpt-term] error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load_or_default();

    if let Err(e) = logging::init(&config.log) {
        eprintln!("warning: logging disabled: {e}");
    }

    if let Some(key) = args.key {
        config.api.api_key = Some(key);
    }
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(model) = args.model {
        config.chat.model = model;
    }
    if args.raw {
        config.chat.raw = true;
    }
    if args.no_stream {
        config.chat.stream = false;
    }

    let api_key = config.api.resolve_api_key()?;
    let client = ChatClient::new(api_key, config.api.timeout())
        .context("failed to build HTTP client")?
        .with_host(config.api.host.clone())
        .with_api_path(config.api.api_path.clone());

    let runtime = tokio::runtime::Runtime::new().context("failed to create async runtime")?;

    if args.list_models {
        let models = runtime.block_on(client.list_models())?;
        for model in models {
            println!("{model}");
        }
        return Ok(());
    }

    let store = match &args.load {
        Some(path) => ConversationStore::load(path)?,
        None => ConversationStore::new(),
    };

    let query = args.query.join(" ");

    let result = runtime.block_on(run_session(config, client, store, args.load, query));
    // A pending stdin read would otherwise hold the runtime open until Enter.
    runtime.shutdown_background();
    result
}

async fn run_session(
    config: Config,
    client: ChatClient,
    store: ConversationStore,
    loaded: Option<PathBuf>,
    query: String,
) -> anyhow::Result<()> {
    let stdout_is_tty = io::stdout().is_terminal();
    let titles = (config.chat.auto_generate_title && stdout_is_tty && query.is_empty())
        .then(|| TitleGenerator::spawn(client.clone(), config.chat.model.clone(), true));
    let settings = SessionSettings::from_config(&config.chat);
    let mut chat = ChatSession::new(client, store, settings, titles);

    // Piped output: one plain, non-streamed answer.
    if !query.is_empty() && !stdout_is_tty {
        let reply = chat.handle_simple(&query).await?;
        println!("{reply}");
        return Ok(());
    }

    let mut renderer = TerminalRenderer::new(io::stdout(), Style::new());
    renderer.set_overflow(config.chat.overflow);

    if !query.is_empty() {
        let status = run_turn(&mut chat, &mut renderer, &query).await;
        if status == TurnStatus::Failed {
            anyhow::bail!("no reply received");
        }
        return Ok(());
    }

    if let Some(path) = &loaded {
        for message in chat.store().messages() {
            renderer.emit_message(message);
        }
        if let Some(stem) = path.file_stem() {
            set_window_title(&stem.to_string_lossy());
        }
        renderer.emit_success(&format!("Chat history loaded from {}", path.display()));
    }
    renderer.emit_notice(&format!(
        "Model: {}. Type /help for commands, Ctrl+C to interrupt a reply.",
        chat.settings().model
    ));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_repl(&mut chat, &mut renderer, stdin).await?;

    if let Some(titles) = chat.titles() {
        if titles.is_busy() {
            titles.wait_idle().await;
        }
    }
    renderer.emit_tokens_spent(chat.total_tokens());
    tracing::info!(tokens = chat.total_tokens(), "session ended");
    Ok(())
}
