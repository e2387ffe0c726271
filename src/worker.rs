//! Project worker loop.
//!
//! Exactly one worker runs per active project. It drains the project's
//! queue in FIFO order, invoking the executor once per task, and exits
//! after a configurable idle window; the next enqueue respawns it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::context;
use crate::error::{ExecError, TaskError};
use crate::registry::{ProjectState, RunningTask, WorkerDeps};
use crate::task::{Task, TaskReport, TaskResult, TaskStatus};

/// Spawn the worker task for one project.
pub(crate) fn spawn(project: String, state: Arc<ProjectState>, deps: Arc<WorkerDeps>) {
    tokio::spawn(run(project, state, deps));
}

async fn run(project: String, state: Arc<ProjectState>, deps: Arc<WorkerDeps>) {
    info!(project = %project, "Worker started");

    loop {
        // Dequeue the head and mark it running in one lock scope, so a
        // status snapshot never sees a task in both places or neither.
        let task = {
            let mut queue = state.queue.lock().await;
            queue.pending.pop_front().map(|mut task| {
                if let Err(e) = task.transition_to(TaskStatus::Running) {
                    error!(task_id = %task.id, "Task state error: {e}");
                }
                queue.running = Some(RunningTask {
                    task_id: task.id,
                    submitter: task.submitter.clone(),
                    text: task.text.clone(),
                    started_at: task.started_at.unwrap_or_else(Utc::now),
                });
                task
            })
        };

        let Some(task) = task else {
            if wait_for_work(&project, &state, deps.worker_idle_timeout).await {
                continue;
            }
            return;
        };

        let task = dispatch(task, &project, &deps).await;

        {
            let mut queue = state.queue.lock().await;
            queue.running = None;
        }

        // Send failure means the receiving side is gone, i.e. shutdown.
        let _ = deps.reports.send(TaskReport::Finished(task));
    }
}

/// Wait for a wakeup. Returns `false` when the worker should exit: idle
/// past the reclamation window with a provably empty queue.
///
/// The exit decision runs under the queue lock, the same lock the
/// producer holds for its spawn decision, so a queued task is never left
/// behind without a worker.
async fn wait_for_work(
    project: &str,
    state: &ProjectState,
    idle_timeout: Option<Duration>,
) -> bool {
    let Some(window) = idle_timeout else {
        state.notify.notified().await;
        return true;
    };

    match tokio::time::timeout(window, state.notify.notified()).await {
        Ok(()) => true,
        Err(_) => {
            let mut queue = state.queue.lock().await;
            if queue.pending.is_empty() {
                queue.worker_alive = false;
                info!(project = %project, "Worker stopping (idle)");
                false
            } else {
                true
            }
        }
    }
}

/// Run one task to a terminal status. Never propagates: every failure
/// mode ends up in the task's result, and the loop keeps going.
async fn dispatch(task: Task, project: &str, deps: &WorkerDeps) -> Task {
    let dir = deps.workspace.project_path(project);

    if !deps.workspace.project_dir_exists(project).await {
        let err = TaskError::ProjectDirectoryMissing {
            project: project.to_string(),
            path: dir,
        };
        warn!(task_id = %task.id, project = %project, "{err}");
        return finish(
            task,
            TaskStatus::Failed,
            TaskResult {
                error: Some(err.to_string()),
                ..TaskResult::default()
            },
        );
    }

    let _ = deps.reports.send(TaskReport::Started {
        task_id: task.id,
        project: project.to_string(),
        origin: task.origin.clone(),
    });

    // Optional per-project context; read trouble downgrades to a warning
    // and the bare task text is used.
    let mut warning = None;
    let context = match context::read_context(&dir, &deps.context_file).await {
        Ok(text) => text,
        Err(e) => {
            warn!(task_id = %task.id, project = %project, "Context read failed: {e}");
            warning = Some(e.to_string());
            None
        }
    };
    let prompt = context::compose_prompt(context.as_deref(), &task.text);

    info!(task_id = %task.id, project = %project, "Executing task");
    match deps.executor.execute(&dir, &prompt, deps.exec_timeout).await {
        Ok(output) => {
            info!(
                task_id = %task.id,
                project = %project,
                exit_code = output.exit_code,
                "Task completed"
            );
            finish(
                task,
                TaskStatus::Completed,
                TaskResult {
                    exit_code: Some(output.exit_code),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    error: None,
                    warning,
                },
            )
        }
        Err(e @ ExecError::Timeout { .. }) => {
            warn!(task_id = %task.id, project = %project, "{e}");
            finish(
                task,
                TaskStatus::TimedOut,
                TaskResult {
                    error: Some(e.to_string()),
                    warning,
                    ..TaskResult::default()
                },
            )
        }
        Err(e) => {
            error!(task_id = %task.id, project = %project, "Execution failed: {e}");
            finish(
                task,
                TaskStatus::Failed,
                TaskResult {
                    error: Some(e.to_string()),
                    warning,
                    ..TaskResult::default()
                },
            )
        }
    }
}

fn finish(mut task: Task, status: TaskStatus, result: TaskResult) -> Task {
    if let Err(e) = task.transition_to(status) {
        error!(task_id = %task.id, "Task state error: {e}");
    }
    task.result = Some(result);
    task
}
