//! Tracing subscriber writing to the chat log file.
//!
//! The terminal belongs to the chat, so log lines go to
//! `~/.local/share/gpt-term/chat.log` (or `[log] path`). `RUST_LOG` overrides
//! the configured level.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Does nothing when logging is disabled.
pub fn init(config: &LogConfig) -> io::Result<()> {
    if !config.enabled {
        return Ok(());
    }
    init_at(&config.resolve_path(), &config.level)
}

fn init_at(path: &Path, level: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt_layer)
        .try_init();
    Ok(())
}
