//! Editor/session slice: the currently selected project and the source
//! being edited.

use chrono::Utc;

pub const DEFAULT_PROJECT_NAME: &str = "Plain Multisig Wallet";

/// Selection and source state of the (single) editing session.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub project_id: String,
    pub project_revision: i64,
    pub project_name: String,
    /// Current source, base64-encoded at rest.
    pub base64_source: String,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            project_revision: 0,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            base64_source: String::new(),
        }
    }
}

impl EditorState {
    /// A project is addressable iff a non-blank id is selected.
    pub fn is_project_id_valid(&self) -> bool {
        !self.project_id.trim().is_empty()
    }

    /// Selects a project. A blank id is ignored; a missing or non-positive
    /// revision derives a fresh one from the wall clock.
    pub fn set_project_id(&mut self, project_id: &str, revision: Option<i64>) {
        if project_id.trim().is_empty() {
            return;
        }

        self.project_id = project_id.to_string();
        self.project_revision = match revision {
            Some(revision) if revision > 0 => revision,
            _ => next_revision(),
        };
    }

    /// Drops the selection entirely. The terminal "no active project"
    /// state, not an error.
    pub fn clear_project_id(&mut self) {
        self.project_id.clear();
        self.project_revision = 0;
    }
}

/// Derives a fresh revision from the wall clock, in milliseconds.
pub fn next_revision() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selection_is_invalid() {
        let editor = EditorState::default();
        assert!(!editor.is_project_id_valid());
        assert_eq!(editor.project_name, DEFAULT_PROJECT_NAME);
    }

    #[test]
    fn blank_project_id_is_ignored() {
        let mut editor = EditorState::default();
        editor.set_project_id("", None);
        editor.set_project_id("   ", Some(42));
        assert!(!editor.is_project_id_valid());
        assert_eq!(editor.project_revision, 0);
    }

    #[test]
    fn explicit_revision_is_kept_fresh_one_derived_otherwise() {
        let mut editor = EditorState::default();
        editor.set_project_id("p1", Some(1234));
        assert_eq!(editor.project_revision, 1234);

        editor.set_project_id("p1", None);
        assert!(editor.project_revision > 1234);

        editor.set_project_id("p1", Some(0));
        assert!(editor.project_revision > 1234);
    }

    #[test]
    fn clearing_resets_both_id_and_revision() {
        let mut editor = EditorState::default();
        editor.set_project_id("p1", Some(9));
        editor.clear_project_id();
        assert!(!editor.is_project_id_valid());
        assert_eq!(editor.project_revision, 0);
    }
}
