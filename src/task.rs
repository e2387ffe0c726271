//! Task model and state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting in its project's queue.
    Pending,
    /// Task is currently executing.
    Running,
    /// Execution finished; the exit code (zero or not) is in the result.
    Completed,
    /// Execution could not run or could not be launched.
    Failed,
    /// Execution exceeded the wall-clock ceiling and was killed.
    TimedOut,
}

impl TaskStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Completed) | (Running, Failed) | (Running, TimedOut)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Check if the task is active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// Where a task was submitted from, kept so the result can be delivered
/// back to the originating chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOrigin {
    /// Channel name ("telegram", "cli").
    pub channel: String,
    /// Channel-specific routing metadata (e.g. Telegram chat_id).
    pub metadata: serde_json::Value,
}

impl MessageOrigin {
    pub fn new(channel: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            metadata,
        }
    }
}

/// Captured output of one execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskResult {
    /// Exit code of the executor process, if it ran to completion.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Error detail for Failed/TimedOut tasks.
    pub error: Option<String>,
    /// Non-fatal warning attached during dispatch (e.g. unreadable
    /// context file).
    pub warning: Option<String>,
}

/// A user-submitted work item bound to one project.
///
/// Immutable once created apart from its status, timestamps, and result,
/// which are updated only by the worker that owns the project's queue. A
/// task in a terminal status is never mutated again.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Unique task ID.
    pub id: Uuid,
    /// Project the task runs against.
    pub project: String,
    /// Identity of the submitter.
    pub submitter: String,
    /// Raw task text as submitted.
    pub text: String,
    /// Current status.
    pub status: TaskStatus,
    /// When the task was enqueued.
    pub created_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Captured output, set when the task reaches a terminal status.
    pub result: Option<TaskResult>,
    /// Delivery route for progress and result messages.
    pub origin: MessageOrigin,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        project: impl Into<String>,
        submitter: impl Into<String>,
        text: impl Into<String>,
        origin: MessageOrigin,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project: project.into(),
            submitter: submitter.into(),
            text: text.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            origin,
        }
    }

    /// Transition to a new status, updating timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status, new_status
            ));
        }

        self.status = new_status;
        match new_status {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Duration since execution started (up to finish time for terminal
    /// tasks). `None` if the task never started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            let end = self.finished_at.unwrap_or_else(Utc::now);
            let duration = end.signed_duration_since(start);
            Duration::from_secs(duration.num_seconds().max(0) as u64)
        })
    }
}

/// Progress events emitted by workers and consumed by the delivery loop.
#[derive(Debug, Clone)]
pub enum TaskReport {
    /// A worker picked the task up and execution began.
    Started {
        task_id: Uuid,
        project: String,
        origin: MessageOrigin,
    },
    /// The task reached a terminal status; carries the full task with
    /// its result.
    Finished(Task),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_origin() -> MessageOrigin {
        MessageOrigin::new("cli", serde_json::Value::Null)
    }

    #[test]
    fn status_transitions_valid() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::TimedOut));
    }

    #[test]
    fn status_transitions_invalid() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::TimedOut.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn task_transitions_set_timestamps() {
        let mut task = Task::new("proj", "alice", "do the thing", test_origin());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());

        task.transition_to(TaskStatus::Running).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        task.transition_to(TaskStatus::Completed).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.finished_at.is_some());
    }

    #[test]
    fn task_never_leaves_terminal_status() {
        let mut task = Task::new("proj", "alice", "text", test_origin());
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Failed).unwrap();

        assert!(task.transition_to(TaskStatus::Running).is_err());
        assert!(task.transition_to(TaskStatus::Completed).is_err());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn elapsed_none_before_start() {
        let task = Task::new("proj", "alice", "text", test_origin());
        assert!(task.elapsed().is_none());
    }

    #[test]
    fn status_display() {
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!(TaskStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn status_serde_roundtrip() {
        let status = TaskStatus::TimedOut;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"timed_out\"");
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
