//! Main bot loop — routes chat messages into the task queues and
//! delivers worker results back to the originating chats.
//!
//! Two loops run side by side: the message loop consumes the merged
//! channel stream and dispatches commands, and the delivery loop
//! consumes worker reports and renders them as replies. They never
//! share mutable state; the registry sits between them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::command::{Command, CommandParser};
use crate::config::Config;
use crate::error::{Error, WorkspaceError};
use crate::executor::floor_char_boundary;
use crate::registry::{ProjectStatus, Registry};
use crate::session::SessionStore;
use crate::task::{MessageOrigin, Task, TaskReport, TaskStatus};
use crate::workspace::Workspace;

/// Collapse a task text into a single-line preview for status display.
pub fn truncate_for_preview(text: &str, max_chars: usize) -> String {
    let collapsed: String = text
        .chars()
        .take(max_chars + 50)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > max_chars {
        let byte_offset = collapsed
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(collapsed.len());
        format!("{}...", &collapsed[..byte_offset])
    } else {
        collapsed
    }
}

/// The bot: wires channels, sessions, workspace, and the task registry
/// together.
pub struct Bot {
    config: Config,
    registry: Arc<Registry>,
    workspace: Arc<Workspace>,
    sessions: SessionStore,
    channels: Arc<ChannelManager>,
}

impl Bot {
    pub fn new(
        config: Config,
        registry: Arc<Registry>,
        workspace: Arc<Workspace>,
        channels: ChannelManager,
    ) -> Self {
        Self {
            config,
            registry,
            workspace,
            sessions: SessionStore::new(),
            channels: Arc::new(channels),
        }
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run the bot until Ctrl+C, /quit, or all channel streams end.
    ///
    /// `reports` is the stream of worker lifecycle events; they are
    /// delivered to the chat each task originated from.
    pub async fn run(self, mut reports: mpsc::UnboundedReceiver<TaskReport>) -> Result<(), Error> {
        // Start channels
        let mut message_stream = self.channels.start_all().await?;

        // Spawn the result delivery loop
        let delivery_handle = {
            let channels = Arc::clone(&self.channels);
            let reply_limit = self.config.reply_limit;
            tokio::spawn(async move {
                while let Some(report) = reports.recv().await {
                    deliver_report(&channels, report, reply_limit).await;
                }
            })
        };

        info!("Bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            match self.handle_message(&message).await {
                Ok(Some(response)) if !response.is_empty() => {
                    let _ = self
                        .channels
                        .respond(&message, OutgoingResponse::text(response))
                        .await;
                }
                Ok(Some(_)) => {
                    // Empty response, nothing to send
                }
                Ok(None) => {
                    // Shutdown signal received (/quit, /exit, /shutdown)
                    info!("Shutdown command received, exiting...");
                    break;
                }
                Err(e) => {
                    error!("Error handling message: {}", e);
                    let _ = self
                        .channels
                        .respond(&message, OutgoingResponse::text(format!("Error: {}", e)))
                        .await;
                }
            }
        }

        info!("Bot shutting down...");
        delivery_handle.abort();
        self.channels.shutdown_all().await?;

        Ok(())
    }

    // ── Message dispatch ────────────────────────────────────────────

    /// Handle one inbound message. `Ok(None)` means shut down.
    async fn handle_message(&self, message: &IncomingMessage) -> Result<Option<String>, Error> {
        debug!(
            "Received message from {} on {} ({} chars)",
            message.user_id,
            message.channel,
            message.content.len()
        );

        match CommandParser::parse(&message.content) {
            Command::Start | Command::Help => Ok(Some(help_text())),
            Command::Projects | Command::Cd(None) => Ok(Some(self.list_projects().await?)),
            Command::Cd(Some(name)) => Ok(Some(self.select_project(message, &name).await?)),
            Command::Create(name) => Ok(Some(self.create_project(name.as_deref()).await)),
            Command::Status => Ok(Some(self.render_status().await)),
            Command::Quit => Ok(None),
            Command::Unknown(word) => {
                Ok(Some(format!("Unknown command: {word}. Send /help for usage.")))
            }
            Command::Task(text) => Ok(Some(self.submit_task(message, &text).await)),
        }
    }

    // ── Command handlers ────────────────────────────────────────────

    async fn list_projects(&self) -> Result<String, Error> {
        let projects = self.workspace.projects().await?;
        if projects.is_empty() {
            return Ok("Workspace is empty. Use /create <project_name> to add one.".into());
        }

        let mut msg = String::from("📁 Project directories:\n");
        for name in &projects {
            msg.push_str("- ");
            msg.push_str(name);
            msg.push('\n');
        }
        msg.push_str("\nUse /cd <name> to select one.");
        Ok(msg)
    }

    async fn select_project(
        &self,
        message: &IncomingMessage,
        name: &str,
    ) -> Result<String, Error> {
        let projects = self.workspace.projects().await?;
        if !projects.iter().any(|p| p == name) {
            let mut msg = format!("⚠️ No project directory named '{name}'.");
            if projects.is_empty() {
                msg.push_str(" Workspace is empty; use /create <project_name> first.");
            } else {
                msg.push_str("\n\nAvailable:\n");
                for p in &projects {
                    msg.push_str("- ");
                    msg.push_str(p);
                    msg.push('\n');
                }
            }
            return Ok(msg);
        }

        self.sessions.select_project(&message.user_id, name).await;
        Ok(format!(
            "✅ Current working directory switched to: {name}\n\
             Subsequent tasks will execute in this folder."
        ))
    }

    async fn create_project(&self, name: Option<&str>) -> String {
        let Some(name) = name else {
            return "Usage: /create <project_name>".into();
        };

        match self.workspace.create_project(name).await {
            Ok(_) => format!("✅ Project '{name}' created successfully."),
            Err(WorkspaceError::InvalidName(_)) => {
                "Invalid project name. Use alphanumeric characters, underscores, or hyphens."
                    .into()
            }
            Err(WorkspaceError::AlreadyExists(_)) => {
                format!("⚠️ Project '{name}' already exists.")
            }
            Err(e) => format!("❌ Failed to create project: {e}"),
        }
    }

    async fn render_status(&self) -> String {
        format_status(&self.registry.status().await)
    }

    async fn submit_task(&self, message: &IncomingMessage, text: &str) -> String {
        let Some(project) = self.sessions.selected_project(&message.user_id).await else {
            return "⚠️ No project selected. Use /cd <name> to pick the directory \
                    tasks run in, or /create <name> to make one."
                .into();
        };

        let origin = MessageOrigin::new(&message.channel, message.metadata.clone());
        match self
            .registry
            .enqueue(&project, &message.user_id, text, origin)
            .await
        {
            Ok(ahead) => format!("📝 Task queued for {project}\n{ahead} tasks ahead in this folder."),
            Err(e) => format!("⚠️ {e}"),
        }
    }
}

// ── Status rendering ────────────────────────────────────────────────

/// Render the registry snapshot as the /status reply.
fn format_status(snapshot: &BTreeMap<String, ProjectStatus>) -> String {
    let mut running = Vec::new();
    let mut queued = Vec::new();

    for (project, status) in snapshot {
        if let Some(ref task) = status.running {
            let preview = truncate_for_preview(&task.text, 30);
            let elapsed = (Utc::now() - task.started_at).num_seconds().max(0);
            running.push(format!("- `{project}`: {preview} ({elapsed}s)"));
        }
        if status.pending > 0 {
            queued.push(format!("- `{project}`: {} tasks waiting", status.pending));
        }
    }

    if running.is_empty() && queued.is_empty() {
        return "📭 No tasks running or queued.".into();
    }

    let mut msg = String::from("📊 **System Status**\n");
    if !running.is_empty() {
        msg.push_str("\n🏃 **Running Tasks:**\n");
        msg.push_str(&running.join("\n"));
        msg.push('\n');
    }
    if !queued.is_empty() {
        msg.push_str("\n⏳ **Queued Tasks:**\n");
        msg.push_str(&queued.join("\n"));
    }
    msg
}

// ── Result delivery ─────────────────────────────────────────────────

/// Deliver one worker report to the chat its task came from.
async fn deliver_report(channels: &ChannelManager, report: TaskReport, reply_limit: usize) {
    match report {
        TaskReport::Started {
            task_id,
            project,
            origin,
        } => {
            if let Err(e) = channels
                .send_status(
                    &origin.channel,
                    StatusUpdate::Executing { project },
                    &origin.metadata,
                )
                .await
            {
                debug!(task_id = %task_id, "Execution notice not delivered: {e}");
            }
        }
        TaskReport::Finished(task) => {
            let reply = format_result(&task, reply_limit);
            // Rebuild enough of the inbound message for channel routing
            let target = IncomingMessage::new(&task.origin.channel, &task.submitter, &task.text)
                .with_metadata(task.origin.metadata.clone());
            if let Err(e) = channels.respond(&target, OutgoingResponse::text(reply)).await {
                error!(task_id = %task.id, "Failed to deliver task result: {e}");
            }
        }
    }
}

/// Render a finished task as a chat reply, capped at `reply_limit` bytes.
fn format_result(task: &Task, reply_limit: usize) -> String {
    let result = task.result.clone().unwrap_or_default();

    let mut reply = match task.status {
        TaskStatus::Completed => match result.exit_code {
            Some(0) | None => String::from("✅ Task Completed"),
            Some(code) => format!("⚠️ Task Completed (exit code {code})"),
        },
        TaskStatus::Failed | TaskStatus::TimedOut => format!(
            "❌ Execution Failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ),
        // Workers only report terminal tasks
        TaskStatus::Pending | TaskStatus::Running => format!("Task is {}", task.status),
    };

    // The warning goes above the output so truncation can't eat it
    if let Some(ref warning) = result.warning {
        reply.push_str("\n\n⚠️ Warning: ");
        reply.push_str(warning);
    }

    if task.status == TaskStatus::Completed {
        reply.push_str("\n\n[Output]:\n");
        reply.push_str(if result.stdout.is_empty() {
            "(no output)"
        } else {
            &result.stdout
        });
        if !result.stderr.is_empty() {
            reply.push_str("\n\n[Error/Warning]:\n");
            reply.push_str(&result.stderr);
        }
    }

    truncate_reply(reply, reply_limit)
}

/// Cap a reply, marking the cut. The per-channel splitter still chunks
/// anything under the cap that exceeds transport limits.
fn truncate_reply(reply: String, limit: usize) -> String {
    if reply.len() <= limit {
        return reply;
    }
    let cut = floor_char_boundary(&reply, limit);
    format!("{}...\n[Output Truncated]", &reply[..cut])
}

fn help_text() -> String {
    "🤖 Project task bot\n\n\
     Send any text message and it runs as a task in your selected project \
     directory. Tasks queue per project and run one at a time; different \
     projects run in parallel.\n\n\
     Commands:\n\
     /projects — list project directories\n\
     /cd <name> — select the directory tasks run in\n\
     /create <name> — create a new project directory\n\
     /status — show running and queued tasks\n\
     /help — this message\n\
     /quit — shut down"
        .to_string()
}

// ── Tests ───────────────────────────────────────────────────────────
