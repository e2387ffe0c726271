//! Per-project queue registry and status snapshots.
//!
//! The registry maps project names to their queue and worker state.
//! Entries are created lazily on the first task for a project and never
//! removed; within one project tasks run strictly one at a time in
//! submission order, while different projects execute fully in parallel.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::TaskError;
use crate::executor::Executor;
use crate::task::{MessageOrigin, Task, TaskReport};
use crate::worker;
use crate::workspace::{self, Workspace};

/// Snapshot of the currently executing task for one project.
#[derive(Debug, Clone, Serialize)]
pub struct RunningTask {
    pub task_id: Uuid,
    pub submitter: String,
    pub text: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of one project's scheduling state.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    /// Tasks waiting in the queue (excludes the running task).
    pub pending: usize,
    pub running: Option<RunningTask>,
}

impl ProjectStatus {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.running.is_none()
    }
}

/// Queue contents and worker presence for one project.
///
/// Everything lives under one mutex so that dequeue-and-mark-running is
/// a single atomic step, status snapshots are per-project consistent,
/// and the worker's idle-exit decision is serialized against the
/// producer's respawn decision.
pub(crate) struct QueueState {
    pub(crate) pending: VecDeque<Task>,
    pub(crate) running: Option<RunningTask>,
    pub(crate) worker_alive: bool,
}

/// Shared state for one project: its queue plus the wakeup signal for
/// the owning worker.
pub(crate) struct ProjectState {
    pub(crate) queue: Mutex<QueueState>,
    /// Wakes the worker when a task arrives. `notify_one` stores a
    /// permit, so a notification sent before the worker waits is kept.
    pub(crate) notify: Notify,
}

impl ProjectState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: None,
                worker_alive: false,
            }),
            notify: Notify::new(),
        })
    }
}

/// Everything a worker needs besides its project's own state.
pub(crate) struct WorkerDeps {
    pub(crate) workspace: Arc<Workspace>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) reports: mpsc::UnboundedSender<TaskReport>,
    pub(crate) exec_timeout: Duration,
    pub(crate) worker_idle_timeout: Option<Duration>,
    pub(crate) context_file: String,
}

/// Registry of per-project queues and workers.
pub struct Registry {
    /// Structural lock: guards insertion of new project entries only.
    /// Never held across an executor call or while a queue lock is held.
    projects: Mutex<HashMap<String, Arc<ProjectState>>>,
    deps: Arc<WorkerDeps>,
}

impl Registry {
    pub fn new(
        workspace: Arc<Workspace>,
        executor: Arc<dyn Executor>,
        config: &Config,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            projects: Mutex::new(HashMap::new()),
            deps: Arc::new(WorkerDeps {
                workspace,
                executor,
                reports,
                exec_timeout: config.exec_timeout,
                worker_idle_timeout: config.worker_idle_timeout,
                context_file: config.context_file.clone(),
            }),
        })
    }

    /// Enqueue a task for a project, creating the project's queue and
    /// worker on first use.
    ///
    /// Returns the number of tasks ahead of the new one in the queue
    /// (the running task, if any, is not counted). The project directory
    /// is not required to exist yet; it is checked at dispatch time.
    pub async fn enqueue(
        &self,
        project: &str,
        submitter: &str,
        text: &str,
        origin: MessageOrigin,
    ) -> Result<usize, TaskError> {
        if !workspace::is_valid_project_name(project) {
            return Err(TaskError::InvalidRequest(format!(
                "invalid project name: {project:?}"
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(TaskError::InvalidRequest(
                "task text must not be empty".to_string(),
            ));
        }

        let task = Task::new(project, submitter, text, origin);
        let task_id = task.id;
        let state = self.get_or_create(project).await;

        let (position, spawn_worker) = {
            let mut queue = state.queue.lock().await;
            queue.pending.push_back(task);
            let position = queue.pending.len() - 1;

            // Test-and-set under the queue lock; pairs with the worker's
            // idle-exit check so exactly one worker exists while the
            // queue is non-empty.
            let spawn_worker = !queue.worker_alive;
            if spawn_worker {
                queue.worker_alive = true;
            }
            (position, spawn_worker)
        };

        if spawn_worker {
            worker::spawn(
                project.to_string(),
                Arc::clone(&state),
                Arc::clone(&self.deps),
            );
        }
        state.notify.notify_one();

        debug!(
            task_id = %task_id,
            project = %project,
            position,
            spawned_worker = spawn_worker,
            "Task enqueued"
        );
        Ok(position)
    }

    /// Snapshot of all known projects. Each project's pending count and
    /// running task are read together under that project's lock; there
    /// is no cross-project atomicity.
    pub async fn status(&self) -> BTreeMap<String, ProjectStatus> {
        let entries: Vec<(String, Arc<ProjectState>)> = {
            let projects = self.projects.lock().await;
            projects
                .iter()
                .map(|(name, state)| (name.clone(), Arc::clone(state)))
                .collect()
        };

        let mut snapshot = BTreeMap::new();
        for (name, state) in entries {
            let queue = state.queue.lock().await;
            snapshot.insert(
                name,
                ProjectStatus {
                    pending: queue.pending.len(),
                    running: queue.running.clone(),
                },
            );
        }
        snapshot
    }

    /// Look up or atomically create a project entry. Two concurrent
    /// first submissions for the same name see the same entry.
    async fn get_or_create(&self, project: &str) -> Arc<ProjectState> {
        let mut projects = self.projects.lock().await;
        Arc::clone(
            projects
                .entry(project.to_string())
                .or_insert_with(ProjectState::new),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::executor::ExecOutput;
    use crate::task::TaskStatus;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Executor that never finishes, for pinning tasks in Running.
    struct HangingExecutor;

    #[async_trait]
    impl Executor for HangingExecutor {
        async fn execute(
            &self,
            _dir: &Path,
            _prompt: &str,
            _timeout: Duration,
        ) -> Result<ExecOutput, ExecError> {
            std::future::pending().await
        }
    }

    struct Fixture {
        registry: Arc<Registry>,
        reports: mpsc::UnboundedReceiver<TaskReport>,
        _dir: TempDir,
    }

    fn fixture(executor: Arc<dyn Executor>) -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("proj")).unwrap();
        let workspace = Arc::new(Workspace::new(dir.path().to_path_buf()));
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Registry::new(workspace, executor, &Config::default(), tx);
        Fixture {
            registry,
            reports: rx,
            _dir: dir,
        }
    }

    fn origin() -> MessageOrigin {
        MessageOrigin::new("cli", serde_json::Value::Null)
    }

    #[tokio::test]
    async fn enqueue_rejects_bad_project_name() {
        let mut fx = fixture(Arc::new(HangingExecutor));
        let err = fx
            .registry
            .enqueue("../evil", "alice", "task", origin())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidRequest(_)));
        assert!(fx.reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn enqueue_rejects_empty_text() {
        let fx = fixture(Arc::new(HangingExecutor));
        let err = fx
            .registry
            .enqueue("proj", "alice", "   ", origin())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn status_empty_initially() {
        let fx = fixture(Arc::new(HangingExecutor));
        assert!(fx.registry.status().await.is_empty());
    }

    #[tokio::test]
    async fn first_task_position_is_zero() {
        let fx = fixture(Arc::new(HangingExecutor));
        let position = fx
            .registry
            .enqueue("proj", "alice", "first", origin())
            .await
            .unwrap();
        assert_eq!(position, 0);
    }

    #[tokio::test]
    async fn running_task_not_counted_in_position() {
        let mut fx = fixture(Arc::new(HangingExecutor));
        fx.registry
            .enqueue("proj", "alice", "first", origin())
            .await
            .unwrap();

        // Wait until the worker has picked the first task up.
        match fx.reports.recv().await.unwrap() {
            TaskReport::Started { project, .. } => assert_eq!(project, "proj"),
            other => panic!("expected Started, got {other:?}"),
        }

        let position = fx
            .registry
            .enqueue("proj", "alice", "second", origin())
            .await
            .unwrap();
        assert_eq!(position, 0);

        let status = fx.registry.status().await;
        let proj = &status["proj"];
        assert_eq!(proj.pending, 1);
        let running = proj.running.as_ref().unwrap();
        assert_eq!(running.text, "first");
        assert_eq!(running.submitter, "alice");
    }

    #[tokio::test]
    async fn missing_directory_fails_without_executing() {
        let mut fx = fixture(Arc::new(HangingExecutor));
        fx.registry
            .enqueue("ghost", "alice", "task", origin())
            .await
            .unwrap();

        // No Started report: the failure comes straight back.
        match fx.reports.recv().await.unwrap() {
            TaskReport::Finished(task) => {
                assert_eq!(task.status, TaskStatus::Failed);
                let result = task.result.unwrap();
                assert!(result.error.unwrap().contains("does not exist"));
            }
            other => panic!("expected Finished, got {other:?}"),
        }

        let status = fx.registry.status().await;
        assert!(status["ghost"].is_idle());
    }

    #[tokio::test]
    async fn concurrent_first_enqueues_share_one_entry() {
        let fx = fixture(Arc::new(HangingExecutor));
        let (a, b) = tokio::join!(
            fx.registry.enqueue("proj", "alice", "one", origin()),
            fx.registry.enqueue("proj", "bob", "two", origin()),
        );
        a.unwrap();
        b.unwrap();

        let status = fx.registry.status().await;
        assert_eq!(status.len(), 1);
        let proj = &status["proj"];
        // Both tasks are accounted for, whether or not the worker has
        // picked the first one up yet.
        let total = proj.pending + usize::from(proj.running.is_some());
        assert_eq!(total, 2);
    }
}
