//! Error types for agentq.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Task scheduling errors.
///
/// `InvalidRequest` is the only error `Registry::enqueue` returns; the task
/// is rejected synchronously and nothing is queued. `ProjectDirectoryMissing`
/// surfaces later, at dispatch time inside the worker, where it marks the
/// task `Failed` instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Project directory missing for {project}: {path} does not exist or is not a directory")]
    ProjectDirectoryMissing { project: String, path: PathBuf },
}

/// Executor errors. A non-zero exit code is not an error — it is surfaced
/// inside a completed result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Task timed out after {} seconds", timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("IO error during execution: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace/project-directory errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Invalid project name: {0} (use alphanumeric characters, underscores, or hyphens)")]
    InvalidName(String),

    #[error("Project already exists: {0}")]
    AlreadyExists(String),

    #[error("Context file unreadable at {path}: {reason}")]
    ContextUnavailable { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
