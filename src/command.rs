//! Command parsing for inbound chat messages.
//!
//! Every message is either a slash command or a task submission for the
//! sender's selected project. Command words match case-insensitively;
//! arguments keep their case because project names are case-sensitive
//! on disk.

/// Parses message content into a Command.
pub struct CommandParser;

impl CommandParser {
    /// Parse message content into a Command.
    pub fn parse(content: &str) -> Command {
        let trimmed = content.trim();

        if !trimmed.starts_with('/') {
            return Command::Task(trimmed.to_string());
        }

        let mut words = trimmed.split_whitespace();
        let word = words.next().unwrap_or(trimmed);
        // Telegram group chats address commands as /status@botname
        let word = word.split('@').next().unwrap_or(word).to_lowercase();
        let arg = words.next().map(str::to_string);

        match word.as_str() {
            "/start" => Command::Start,
            "/help" | "/?" => Command::Help,
            "/projects" => Command::Projects,
            "/cd" => Command::Cd(arg),
            "/create" => Command::Create(arg),
            "/status" => Command::Status,
            "/quit" | "/exit" | "/shutdown" => Command::Quit,
            _ => Command::Unknown(word),
        }
    }
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` — greeting and usage summary.
    Start,

    /// `/help` — usage summary.
    Help,

    /// `/projects` — list workspace project directories.
    Projects,

    /// `/cd [name]` — select a project; with no argument, lists projects.
    Cd(Option<String>),

    /// `/create [name]` — create a new project directory.
    Create(Option<String>),

    /// `/status` — show running and queued tasks across all projects.
    Status,

    /// `/quit` — shut down the bot.
    Quit,

    /// Slash command we don't recognize. Never executed as a task.
    Unknown(String),

    /// Plain text — a task submission for the selected project.
    Task(String),
}
