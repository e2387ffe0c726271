//! Configuration, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default executor command. The prompt is piped to the child's stdin.
const DEFAULT_EXECUTOR_CMD: &str = "gemini --yolo --prompt -";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one subdirectory per project.
    pub workspace_dir: PathBuf,
    /// Executor argv (program plus leading args); the prompt is written to
    /// the child's stdin.
    pub executor_cmd: Vec<String>,
    /// Wall-clock ceiling for one task execution.
    pub exec_timeout: Duration,
    /// Idle period after which a project worker exits. `None` keeps workers
    /// alive for the life of the process.
    pub worker_idle_timeout: Option<Duration>,
    /// Per-project context file name, prepended to every prompt when present.
    pub context_file: String,
    /// Maximum characters of executor output included in a reply.
    pub reply_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/workspace"),
            executor_cmd: split_argv(DEFAULT_EXECUTOR_CMD),
            exec_timeout: Duration::from_secs(600), // 10 minutes
            worker_idle_timeout: Some(Duration::from_secs(300)), // 5 minutes
            context_file: "AGENT.md".to_string(),
            reply_limit: 4000,
        }
    }
}

impl Config {
    /// Build config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let workspace_dir = std::env::var("WORKSPACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/workspace"));

        let executor_cmd = match std::env::var("AGENTQ_EXECUTOR_CMD") {
            Ok(raw) => parse_executor_cmd(&raw)?,
            Err(_) => split_argv(DEFAULT_EXECUTOR_CMD),
        };

        let exec_timeout = Duration::from_secs(parse_u64_var("AGENTQ_EXEC_TIMEOUT_SECS", 600)?);

        let idle_secs = parse_u64_var("AGENTQ_WORKER_IDLE_SECS", 300)?;
        let worker_idle_timeout = if idle_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(idle_secs))
        };

        let context_file =
            std::env::var("AGENTQ_CONTEXT_FILE").unwrap_or_else(|_| "AGENT.md".to_string());

        let reply_limit = parse_u64_var("AGENTQ_REPLY_LIMIT", 4000)? as usize;

        Ok(Self {
            workspace_dir,
            executor_cmd,
            exec_timeout,
            worker_idle_timeout,
            context_file,
            reply_limit,
        })
    }
}

/// Telegram channel configuration, built from environment variables.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// Build config from environment variables.
    /// Returns `None` if `TELEGRAM_BOT_TOKEN` is not set (channel disabled).
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;

        let allowed_users = parse_allowed_users(
            &std::env::var("TELEGRAM_ALLOWED_USERS").unwrap_or_else(|_| "*".to_string()),
        );

        Some(Self {
            bot_token: SecretString::from(bot_token),
            allowed_users,
        })
    }
}

fn parse_u64_var(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Split a command line on whitespace. No quoting; an executor that needs
/// shell features should be wrapped in a script.
fn split_argv(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}

fn parse_executor_cmd(raw: &str) -> Result<Vec<String>, ConfigError> {
    let argv = split_argv(raw);
    if argv.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "AGENTQ_EXECUTOR_CMD".to_string(),
            message: "command must not be empty".to_string(),
        });
    }
    Ok(argv)
}

/// Parse a comma-separated allowlist, dropping empty entries.
fn parse_allowed_users(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
