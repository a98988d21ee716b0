use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::renderer::Overflow;

const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no API key: set api_key or api_key_cmd in [api], or export {API_KEY_ENV}")]
    MissingApiKey,
    #[error("api_key_cmd failed: {0}")]
    KeyCommand(String),
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// API key stored in the file. Prefer `api_key_cmd` or the environment.
    #[serde(alias = "key")]
    pub api_key: Option<String>,
    /// Command printing the API key (run via `sh -c`).
    pub api_key_cmd: Option<String>,
    pub host: String,
    pub api_path: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_cmd: None,
            host: gt_backend::openai::DEFAULT_HOST.to_string(),
            api_path: gt_backend::openai::DEFAULT_API_PATH.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Resolve the API key: `api_key`, then `api_key_cmd`, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }

        if let Some(cmd) = &self.api_key_cmd {
            let output = Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .output()
                .map_err(|e| ConfigError::KeyCommand(e.to_string()))?;

            if output.status.success() {
                let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !key.is_empty() {
                    return Ok(key);
                }
            }
            tracing::warn!(status = %output.status, "api_key_cmd produced no key");
        }

        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    /// Stream replies as they are generated.
    pub stream: bool,
    /// Print fragments verbatim instead of redrawing the reply.
    pub raw: bool,
    /// What a redrawn reply does when it outgrows the terminal.
    pub overflow: Overflow,
    pub auto_generate_title: bool,
    /// Model name fragments whose replies carry inline `<think>` tags.
    pub reasoning_markers: Vec<String>,
    /// Reasoning token budget for models that accept one; `None` disables it.
    pub thinking_budget: Option<u32>,
    pub max_tokens: u32,
    /// Context window used for the remaining-tokens warning. Derived from
    /// the model name when unset.
    pub tokens_limit: Option<usize>,
    /// Directory for `/save` files and emergency backups. Defaults to the data dir.
    pub chat_save_dir: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 1.0,
            stream: true,
            raw: false,
            overflow: Overflow::Ellipsis,
            auto_generate_title: true,
            reasoning_markers: vec!["sonar-reasoning".to_string(), "deepseek-r1".to_string()],
            thinking_budget: None,
            max_tokens: 5000,
            tokens_limit: None,
            chat_save_dir: None,
        }
    }
}

impl ChatConfig {
    pub fn resolve_save_dir(&self) -> PathBuf {
        match &self.chat_save_dir {
            Some(custom) => PathBuf::from(custom),
            None => data_dir(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Custom log file. Defaults to `~/.local/share/gpt-term/chat.log`.
    pub path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            path: None,
        }
    }
}

impl LogConfig {
    pub fn resolve_path(&self) -> PathBuf {
        match &self.path {
            Some(custom) => PathBuf::from(custom),
            None => data_dir().join("chat.log"),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is missing or invalid.
    pub fn load_or_default() -> Self {
        let path = config_path();
        match Self::load_from(&path) {
            Ok(cfg) => cfg,
            Err(ConfigError::Read { .. }) => Config::default(),
            Err(e) => {
                eprintln!("warning: {e}");
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("gpt-term").join("config.toml")
}

/// `$XDG_DATA_HOME/gpt-term`, or `~/.local/share/gpt-term`.
pub fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("gpt-term")
}

/// Known context window sizes, matched by substring in order.
const TOKEN_LIMITS: &[(&str, usize)] = &[
    ("gpt-4-1106-preview", 128_000),
    ("gpt-4-vision-preview", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo-16k", 16_385),
    ("gpt-3.5-turbo-1106", 16_385),
    ("gpt-3.5-turbo", 4_096),
    ("bedrock/anthropic", 200_000),
    ("anthropic/", 200_000),
    ("bedrock/cohere", 4_096),
    ("bedrock/ai21", 8_192),
    ("bedrock/amazon.nova", 200_000),
];

/// Context window of `model`, if known.
pub fn tokens_limit_for(model: &str) -> Option<usize> {
    TOKEN_LIMITS
        .iter()
        .find(|(fragment, _)| model.contains(fragment))
        .map(|(_, limit)| *limit)
}

/// Models that accept a `thinking` budget in the request.
pub fn supports_thinking_budget(model: &str) -> bool {
    model.contains("claude-3-7-sonnet")
        || model.contains("claude-sonnet-4")
        || model.contains("claude-opus-4")
}

/// Models whose endpoints require an explicit `max_tokens`.
pub fn requires_max_tokens(model: &str) -> bool {
    ["bedrock/anthropic", "bedrock/amazon", "anthropic/"]
        .iter()
        .any(|prefix| model.contains(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.api.host, "https://api.openai.com");
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.chat.model, "gpt-3.5-turbo");
        assert!(cfg.chat.stream);
        assert!(!cfg.chat.raw);
        assert_eq!(cfg.chat.overflow, Overflow::Ellipsis);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn parse_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parse_chat_config() {
        let toml_str = r#"
[chat]
model = "deepseek-r1"
raw = true
overflow = "crop"
reasoning_markers = ["r1"]
thinking_budget = 4096
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.chat.model, "deepseek-r1");
        assert!(cfg.chat.raw);
        assert!(cfg.chat.stream);
        assert_eq!(cfg.chat.overflow, Overflow::Crop);
        assert_eq!(cfg.chat.reasoning_markers, vec!["r1"]);
        assert_eq!(cfg.chat.thinking_budget, Some(4096));
    }

    #[test]
    fn parse_api_config() {
        let toml_str = r#"
[api]
api_key_cmd = "pass show openai"
host = "http://localhost:4000"
timeout_secs = 90
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.api.api_key_cmd.as_deref(), Some("pass show openai"));
        assert_eq!(cfg.api.host, "http://localhost:4000");
        assert_eq!(cfg.api.api_path, "/v1");
        assert_eq!(cfg.api.timeout(), Duration::from_secs(90));
    }

    #[test]
    fn api_key_field_and_short_alias() {
        let cfg: Config = toml::from_str("[api]\napi_key = \"sk-file\"\n").unwrap();
        assert_eq!(cfg.api.api_key.as_deref(), Some("sk-file"));
        let cfg: Config = toml::from_str("[api]\nkey = \"sk-short\"\n").unwrap();
        assert_eq!(cfg.api.api_key.as_deref(), Some("sk-short"));
    }

    #[test]
    fn unknown_overflow_is_a_parse_error() {
        let err = toml::from_str::<Config>("[chat]\noverflow = \"scroll\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chat\nmodel = 1").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn resolve_api_key_prefers_inline_key() {
        let cfg = ApiConfig {
            api_key: Some(" sk-inline ".to_string()),
            api_key_cmd: Some("echo from_cmd".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap(), "sk-inline");
    }

    #[test]
    fn resolve_api_key_from_command() {
        let cfg = ApiConfig {
            api_key_cmd: Some("echo test_key_123".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap(), "test_key_123");
    }

    #[test]
    fn token_limits_by_model() {
        assert_eq!(tokens_limit_for("gpt-4o-mini"), Some(128_000));
        assert_eq!(tokens_limit_for("gpt-4-32k-0613"), Some(32_768));
        assert_eq!(tokens_limit_for("gpt-4"), Some(8_192));
        assert_eq!(tokens_limit_for("gpt-3.5-turbo"), Some(4_096));
        assert_eq!(tokens_limit_for("bedrock/anthropic.claude-3"), Some(200_000));
        assert_eq!(tokens_limit_for("llama3"), None);
    }

    #[test]
    fn thinking_budget_support() {
        assert!(supports_thinking_budget("bedrock/anthropic.claude-3-7-sonnet-20250219-v1:0"));
        assert!(!supports_thinking_budget("gpt-4o"));
    }

    #[test]
    fn max_tokens_requirement() {
        assert!(requires_max_tokens("anthropic/claude-3-haiku"));
        assert!(requires_max_tokens("bedrock/amazon.nova-pro"));
        assert!(!requires_max_tokens("gpt-4o"));
    }

    #[test]
    fn default_paths_end_in_app_dir() {
        assert!(config_path().to_string_lossy().ends_with("gpt-term/config.toml"));
        let log = LogConfig::default().resolve_path();
        assert!(log.to_string_lossy().ends_with("gpt-term/chat.log"));
    }

    #[test]
    fn custom_save_dir() {
        let cfg = ChatConfig {
            chat_save_dir: Some("/tmp/chats".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_save_dir(), PathBuf::from("/tmp/chats"));
    }
}
