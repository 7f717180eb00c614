//! Revision-keyed project history.

use std::collections::BTreeMap;

use crucible_common::Project;

use crate::errors::RuntimeError;

/// All known project snapshots, exactly one per revision. Snapshots are
/// replaced whole on update, never mutated in place.
#[derive(Debug, Default)]
pub struct ProjectHistory {
    projects: BTreeMap<i64, Project>,
}

impl ProjectHistory {
    /// Inserts or replaces the snapshot matching `project.revision`.
    pub fn upsert(&mut self, project: Project) {
        self.projects.insert(project.revision, project);
    }

    /// Looks a snapshot up by revision.
    pub fn by_revision(&self, revision: i64) -> Result<&Project, RuntimeError> {
        self.projects
            .get(&revision)
            .ok_or(RuntimeError::ProjectNotFound { revision })
    }

    pub fn remove_revision(&mut self, revision: i64) {
        self.projects.remove(&revision);
    }

    pub fn clear(&mut self) {
        self.projects.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// All snapshots in revision order.
    pub fn all(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_exactly_one_project_per_revision() {
        let mut history = ProjectHistory::default();
        let mut first = Project::new("p1", 100, "wallet", "a");
        history.upsert(first.clone());

        first.source = "b".into();
        history.upsert(first.clone());
        history.upsert(Project::new("p1", 200, "wallet", "c"));

        let all = history.all();
        assert_eq!(all.len(), 2);
        // Last write wins for revision 100.
        assert_eq!(history.by_revision(100).unwrap().source, "b");
        assert_eq!(history.by_revision(200).unwrap().source, "c");
        assert_eq!(all[0].revision, 100);
        assert_eq!(all[1].revision, 200);
    }

    #[test]
    fn missing_revision_raises_project_not_found() {
        let history = ProjectHistory::default();
        let err = history.by_revision(7).unwrap_err();
        assert!(err.is_project_not_found());
    }

    #[test]
    fn remove_revision_leaves_other_revisions_alone() {
        let mut history = ProjectHistory::default();
        history.upsert(Project::new("p1", 1, "wallet", ""));
        history.upsert(Project::new("p1", 2, "wallet", ""));
        history.remove_revision(1);
        assert!(history.by_revision(1).is_err());
        assert!(history.by_revision(2).is_ok());
        history.clear();
        assert!(history.is_empty());
    }
}
