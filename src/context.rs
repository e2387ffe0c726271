//! Per-project context file and prompt assembly.
//!
//! Each project directory may carry a context file (`AGENT.md` by
//! default) with standing instructions for the executor. When present,
//! its text is prepended to every task prompt inside a fixed framing;
//! when absent, the task text is passed through unchanged.

use std::path::Path;

use tokio::fs;

use crate::error::WorkspaceError;

/// Read the project's context file.
///
/// `Ok(None)` when the file does not exist. Any other read failure is a
/// `ContextUnavailable` error; callers downgrade it to a non-fatal
/// warning and proceed with the bare task text.
pub async fn read_context(
    project_dir: &Path,
    file_name: &str,
) -> Result<Option<String>, WorkspaceError> {
    let path = project_dir.join(file_name);
    match fs::read_to_string(&path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkspaceError::ContextUnavailable {
            path,
            reason: e.to_string(),
        }),
    }
}

/// Assemble the final prompt for one task.
pub fn compose_prompt(context: Option<&str>, task_text: &str) -> String {
    match context {
        Some(rules) => {
            format!("--- Agent Rules ---\n{rules}\n--- End Rules ---\n\n{task_text}")
        }
        None => task_text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_context_present() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("AGENT.md"), "be careful")
            .await
            .unwrap();

        let context = read_context(dir.path(), "AGENT.md").await.unwrap();
        assert_eq!(context.as_deref(), Some("be careful"));
    }

    #[tokio::test]
    async fn read_context_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let context = read_context(dir.path(), "AGENT.md").await.unwrap();
        assert!(context.is_none());
    }

    #[tokio::test]
    async fn read_context_unreadable_is_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the read fail with
        // something other than NotFound.
        tokio::fs::create_dir(dir.path().join("AGENT.md"))
            .await
            .unwrap();

        let err = read_context(dir.path(), "AGENT.md").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::ContextUnavailable { .. }));
    }

    #[test]
    fn compose_prompt_with_context() {
        let prompt = compose_prompt(Some("always run tests"), "fix the bug");
        assert_eq!(
            prompt,
            "--- Agent Rules ---\nalways run tests\n--- End Rules ---\n\nfix the bug"
        );
    }

    #[test]
    fn compose_prompt_without_context_passes_through() {
        assert_eq!(compose_prompt(None, "fix the bug"), "fix the bug");
    }
}
