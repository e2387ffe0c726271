//! Project directory tree on disk.
//!
//! The workspace is a flat directory containing one subdirectory per
//! project. Projects are created through `/create` (or out of band by
//! mounting directories into the workspace) and are never deleted by
//! the bot.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::WorkspaceError;

/// Check a project name: non-empty, ASCII alphanumeric plus `_` and `-`.
///
/// This is also the enqueue-side validity rule, so an accepted name can
/// never resolve outside the workspace root.
pub fn is_valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Project directory tree rooted at a single workspace directory.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the workspace root directory exists.
    pub async fn ensure_root(&self) -> Result<(), WorkspaceError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Absolute path of a project directory. The project need not exist.
    pub fn project_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// List project names (immediate subdirectories of the root), sorted.
    /// A missing workspace root reads as an empty project list.
    pub async fn projects(&self) -> Result<Vec<String>, WorkspaceError> {
        if !fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Create a new project directory. Rejects invalid names and existing
    /// projects.
    pub async fn create_project(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if !is_valid_project_name(name) {
            return Err(WorkspaceError::InvalidName(name.to_string()));
        }

        let path = self.project_path(name);
        if fs::try_exists(&path).await? {
            return Err(WorkspaceError::AlreadyExists(name.to_string()));
        }

        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Check whether a project's directory exists on disk. Consulted at
    /// dispatch time, not at enqueue time.
    pub async fn project_dir_exists(&self, name: &str) -> bool {
        fs::metadata(self.project_path(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_workspace() -> (Workspace, TempDir) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path().to_path_buf());
        (ws, dir)
    }

    #[test]
    fn valid_project_names() {
        assert!(is_valid_project_name("myproject"));
        assert!(is_valid_project_name("my_project-2"));
        assert!(is_valid_project_name("123"));
    }

    #[test]
    fn invalid_project_names() {
        assert!(!is_valid_project_name(""));
        assert!(!is_valid_project_name("my project"));
        assert!(!is_valid_project_name("../escape"));
        assert!(!is_valid_project_name("a/b"));
        assert!(!is_valid_project_name("dot.name"));
    }

    #[tokio::test]
    async fn create_then_list() {
        let (ws, _dir) = test_workspace();
        ws.create_project("beta").await.unwrap();
        ws.create_project("alpha").await.unwrap();

        let projects = ws.projects().await.unwrap();
        assert_eq!(projects, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn list_ignores_plain_files() {
        let (ws, _dir) = test_workspace();
        ws.create_project("proj").await.unwrap();
        tokio::fs::write(ws.root().join("notes.txt"), "not a project")
            .await
            .unwrap();

        let projects = ws.projects().await.unwrap();
        assert_eq!(projects, vec!["proj"]);
    }

    #[tokio::test]
    async fn list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path().join("does-not-exist"));
        let projects = ws.projects().await.unwrap();
        assert!(projects.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_duplicate() {
        let (ws, _dir) = test_workspace();
        ws.create_project("proj").await.unwrap();

        let err = ws.create_project("proj").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn create_rejects_invalid_name() {
        let (ws, dir) = test_workspace();
        let err = ws.create_project("../evil").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidName(_)));
        assert!(!dir.path().parent().unwrap().join("evil").exists());
    }

    #[tokio::test]
    async fn project_dir_exists_checks_disk() {
        let (ws, _dir) = test_workspace();
        assert!(!ws.project_dir_exists("ghost").await);

        ws.create_project("real").await.unwrap();
        assert!(ws.project_dir_exists("real").await);
    }

    #[tokio::test]
    async fn project_dir_exists_false_for_file() {
        let (ws, _dir) = test_workspace();
        tokio::fs::write(ws.root().join("file-not-dir"), "x")
            .await
            .unwrap();
        assert!(!ws.project_dir_exists("file-not-dir").await);
    }
}
