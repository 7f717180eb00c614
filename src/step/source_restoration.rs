//! Source-restoration stage controller.
//!
//! Restoration is the project-creating stage: its start route is the only
//! one that returns a server-assigned `project_id`. On a successful
//! acknowledgement a fresh project snapshot enters the history, the
//! sequencer advances to bitcode generation and the upload toggle flips
//! off.

use std::sync::Arc;

use crucible_common::{Project, Stage, VerificationStep};

use crate::errors::RuntimeError;
use crate::events::{NoticeLevel, VerificationEvent};
use crate::runtime::Runtime;

pub struct SourceRestoration {
    runtime: Arc<Runtime>,
}

impl SourceRestoration {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Restoration shares the upload toggle: always eligible while source
    /// upload is still enabled.
    pub fn can_run(&self) -> bool {
        self.runtime.is_source_upload_enabled()
    }

    /// Asks the service to restore `source` into a fresh project. Returns
    /// the created snapshot on acceptance, `None` when the service
    /// rejected the request.
    pub async fn start(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Option<Project>, RuntimeError> {
        match self.try_start(name, source).await {
            Ok(project) => Ok(project),
            Err(err) if err.is_project_not_found() => Ok(None),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to restore some source code.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }

    async fn try_start(&self, name: &str, source: &str) -> Result<Option<Project>, RuntimeError> {
        let ack = self.runtime.api().start_source_restoration(source).await?;
        if !ack.is_success() {
            self.runtime.events().notify(
                NoticeLevel::Warning,
                "Warning",
                "Sorry, the source restoration has failed.",
            );
            return Ok(None);
        }

        let project_id = ack.project_id.as_deref().unwrap_or_default();
        self.runtime.events().notify(
            NoticeLevel::Success,
            "Success",
            format!("The source was successfully restored under project id {project_id}."),
        );

        self.runtime.set_project_id(project_id, None);
        let editor = self.runtime.editor();

        let mut project = Project::new(editor.project_id, editor.project_revision, name, source);
        project.source_restoration.started = true;
        self.runtime.upsert_project(project.clone());
        self.runtime
            .set_step(VerificationStep::LlvmBitcodeGeneration);
        self.runtime.disable_source_upload();

        Ok(Some(project))
    }

    /// Fetches restoration progress and folds it into a new snapshot.
    pub async fn poll_progress(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_progress(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the source restoration progress.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }

    async fn try_poll_progress(&self, project: &Project) -> Result<(), RuntimeError> {
        let progress = self
            .runtime
            .api()
            .stage_progress(Stage::SourceRestoration, &project.id)
            .await?;
        if progress.is_failure_shaped() {
            // Not ready yet; the next tick retries.
            return Ok(());
        }

        let done = progress.is_exited();
        let mut next = project.clone();
        next.source_restoration.progress = progress.to_value();
        next.source_restoration.done = done;

        let _ = self.poll_report(project).await;
        if let Some(active) = self.runtime.active_project()? {
            next.source_restoration.report = active.source_restoration.report;
        }

        if done {
            next.source_restoration.started = false;
        }

        self.runtime.commit_if_changed(next)?;
        Ok(())
    }

    /// Fetches the restoration log. Restoration reports carry `raw_log`
    /// where the other stages carry `messages`.
    pub async fn poll_report(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_report(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the source restoration report.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }

    async fn try_poll_report(&self, project: &Project) -> Result<(), RuntimeError> {
        let report = self
            .runtime
            .api()
            .stage_report(Stage::SourceRestoration, &project.id)
            .await?;
        if report.raw_log.is_none() || report.error.is_some() {
            return Ok(());
        }

        let text = report.raw_log.clone().unwrap_or_default();
        let mut next = project.clone();
        next.source_restoration.report = report.to_value();
        self.runtime.commit_if_changed(next)?;

        if text.contains("FAILED:") {
            self.runtime
                .events()
                .emit(VerificationEvent::FailedVerificationStep { error: text });
        }
        Ok(())
    }

    /// Clears the restoration flags back to their initial values and
    /// re-upserts. Returns the committed snapshot.
    pub fn reset(&self, project: &Project) -> Project {
        let mut next = project.clone();
        next.source_restoration.reset();
        self.runtime.upsert_project(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use serde_json::{Value, json};

    fn runtime() -> Arc<Runtime> {
        Arc::new(Runtime::new(ApiConfig::with_base_url("http://localhost:3000")).unwrap())
    }

    #[test]
    fn eligibility_follows_the_upload_toggle() {
        let runtime = runtime();
        let restoration = SourceRestoration::new(Arc::clone(&runtime));
        assert!(restoration.can_run());
        runtime.disable_source_upload();
        assert!(!restoration.can_run());
    }

    #[test]
    fn reset_clears_only_the_restoration_stage() {
        let runtime = runtime();
        let restoration = SourceRestoration::new(Arc::clone(&runtime));

        let mut project = Project::new("p1", 1, "wallet", "");
        project.source_restoration.done = true;
        project.source_restoration.report = json!({"raw_log": "restored"});
        project.llvm_bitcode_generation.done = true;
        runtime.upsert_project(project.clone());

        let next = restoration.reset(&project);
        assert!(!next.source_restoration.done);
        assert_eq!(next.source_restoration.report, Value::Null);
        assert!(next.llvm_bitcode_generation.done);
        assert_eq!(
            runtime.project_by_revision(1).unwrap().source_restoration,
            next.source_restoration
        );
    }
}
