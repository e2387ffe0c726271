//! Executor boundary.
//!
//! Runs the configured agent command against a project directory with
//! the assembled prompt on stdin, captured output, and a wall-clock
//! ceiling. The trait keeps the scheduler testable with a deterministic
//! fake; `CommandExecutor` is the production implementation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ExecError;

/// Maximum captured size per output stream (64KB).
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Captured result of one execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability of running one prompt against one directory.
///
/// Implementations must not be assumed idempotent or side-effect-free;
/// the scheduler never invokes two executions for the same project
/// concurrently.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        working_dir: &Path,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError>;
}

/// Executor that spawns a configured command, piping the prompt to its
/// stdin.
pub struct CommandExecutor {
    argv: Vec<String>,
}

impl CommandExecutor {
    /// Create an executor for the given argv (program plus leading args).
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(
        &self,
        working_dir: &Path,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ExecError::Launch {
                program: String::new(),
                reason: "executor command is empty".to_string(),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Timeout expiry drops the wait future, which kills the child.
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ExecError::Launch {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        // Feed stdin while draining output, all inside the timed
        // section. Writing the whole prompt up front can block against
        // a child whose stdout pipe is already full, and a blocked
        // write would stall the deadline before it ever starts.
        let stdin = child.stdin.take();
        let run = async {
            let write = async {
                if let Some(mut stdin) = stdin {
                    // A child that exits without reading stdin closes the
                    // pipe; its output and exit code still tell the real
                    // story.
                    if let Err(e) = stdin.write_all(prompt.as_bytes()).await
                        && e.kind() != std::io::ErrorKind::BrokenPipe
                    {
                        return Err(e);
                    }
                }
                Ok(())
            };
            tokio::join!(write, child.wait_with_output())
        };

        match tokio::time::timeout(timeout, run).await {
            Ok((Ok(()), Ok(output))) => Ok(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: truncate_output(&String::from_utf8_lossy(&output.stdout)),
                stderr: truncate_output(&String::from_utf8_lossy(&output.stderr)),
            }),
            Ok((Err(e), _)) | Ok((Ok(()), Err(e))) => Err(ExecError::Io(e)),
            Err(_) => Err(ExecError::Timeout { timeout }),
        }
    }
}

/// Truncate a captured stream to fit within limits (UTF-8 safe), keeping
/// head and tail.
fn truncate_output(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_SIZE {
        s.to_string()
    } else {
        let half = MAX_OUTPUT_SIZE / 2;
        let head_end = floor_char_boundary(s, half);
        let tail_start = floor_char_boundary(s, s.len() - half);
        format!(
            "{}\n\n... [truncated {} bytes] ...\n\n{}",
            &s[..head_end],
            s.len() - MAX_OUTPUT_SIZE,
            &s[tail_start..]
        )
    }
}

/// Find the largest byte index <= `i` that is a valid char boundary.
pub(crate) fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
