//! Per-submitter project selection.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Maps a submitter identity to their currently selected project.
///
/// Memory-resident; selections are lost on restart. Consulted by the
/// producer layer only, never by the scheduler.
#[derive(Default)]
pub struct SessionStore {
    selections: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The submitter's selected project, if they have chosen one.
    pub async fn selected_project(&self, submitter: &str) -> Option<String> {
        self.selections.read().await.get(submitter).cloned()
    }

    /// Select a project for a submitter, replacing any previous choice.
    pub async fn select_project(
        &self,
        submitter: impl Into<String>,
        project: impl Into<String>,
    ) {
        self.selections
            .write()
            .await
            .insert(submitter.into(), project.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_selection_initially() {
        let store = SessionStore::new();
        assert!(store.selected_project("alice").await.is_none());
    }

    #[tokio::test]
    async fn select_and_read_back() {
        let store = SessionStore::new();
        store.select_project("alice", "proj-a").await;
        assert_eq!(
            store.selected_project("alice").await.as_deref(),
            Some("proj-a")
        );
        assert!(store.selected_project("bob").await.is_none());
    }

    #[tokio::test]
    async fn reselect_overwrites() {
        let store = SessionStore::new();
        store.select_project("alice", "proj-a").await;
        store.select_project("alice", "proj-b").await;
        assert_eq!(
            store.selected_project("alice").await.as_deref(),
            Some("proj-b")
        );
    }
}
