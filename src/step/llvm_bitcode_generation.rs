//! LLVM bitcode generation stage controller.

use std::sync::Arc;

use crucible_common::{Project, Stage, VerificationStep};
use serde_json::Value;

use crate::errors::RuntimeError;
use crate::events::{NoticeLevel, VerificationEvent};
use crate::runtime::Runtime;

pub struct LlvmBitcodeGeneration {
    runtime: Arc<Runtime>,
}

impl LlvmBitcodeGeneration {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Pure eligibility predicate; never raises. Anything unexpected while
    /// resolving the active project becomes a failure event plus `false`.
    pub fn can_run(&self) -> bool {
        if !self.runtime.is_project_id_valid() {
            return false;
        }
        match self.runtime.active_project() {
            Ok(Some(project)) => Self::can_generate_for(&project),
            Ok(None) => false,
            Err(err) if err.is_project_not_found() => false,
            Err(err) => {
                self.runtime
                    .events()
                    .emit(VerificationEvent::FailedVerificationStep {
                        error: err.to_string(),
                    });
                false
            }
        }
    }

    fn can_generate_for(project: &Project) -> bool {
        let stage = project.stage(Stage::LlvmBitcodeGeneration);
        !stage.started && !stage.done
    }

    /// Triggers bitcode generation for the project. On acceptance the
    /// stage is marked started on a fresh snapshot; a rejection leaves
    /// state untouched.
    pub async fn start(&self, project: &Project) -> Result<bool, RuntimeError> {
        self.runtime.hide_editor();
        let _ = self.runtime.show_report(Stage::LlvmBitcodeGeneration);

        match self.try_start(project).await {
            Ok(accepted) => Ok(accepted),
            Err(err) if err.is_project_not_found() => Ok(false),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to generate LLVM bitcode.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }

    async fn try_start(&self, project: &Project) -> Result<bool, RuntimeError> {
        let ack = self
            .runtime
            .api()
            .start_stage(Stage::LlvmBitcodeGeneration, &project.id, None)
            .await?;
        if !ack.is_success() {
            self.runtime.events().notify(
                NoticeLevel::Warning,
                "Warning",
                format!(
                    "Sorry, the LLVM bitcode generation has failed for project having id {}.",
                    project.id
                ),
            );
            return Ok(false);
        }

        self.runtime.events().notify(
            NoticeLevel::Success,
            "Success",
            format!(
                "LLVM bitcode generation has been successfully triggered for project having id {}:\n{}",
                project.id,
                ack.message.as_deref().unwrap_or_default()
            ),
        );

        let mut next = project.clone();
        next.llvm_bitcode_generation.started = true;
        self.runtime.upsert_project(next);
        Ok(true)
    }

    /// Fetches generation progress, cascades into the report poll and
    /// commits a new snapshot only when it differs from the stored one.
    /// Detecting completion flips `started` off in the same update that
    /// sets `done` and advances the sequencer to symbolic execution.
    pub async fn poll_progress(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_progress(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the LLVM bitcode generation progress.",
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
            .stage_progress(Stage::LlvmBitcodeGeneration, &project.id)
            .await?;
        if progress.is_failure_shaped() {
            // Not ready yet; the next tick retries.
            return Ok(());
        }

        let done = progress.is_exited();
        let mut next = project.clone();
        next.llvm_bitcode_generation.progress = progress.to_value();
        next.llvm_bitcode_generation.done = done;

        // Report errors are contained in the report poll itself; the
        // candidate simply keeps whatever report is stored.
        let _ = self.poll_report(project).await;
        if let Some(active) = self.runtime.active_project()? {
            next.llvm_bitcode_generation.report = active.llvm_bitcode_generation.report;
        }

        if done {
            next.llvm_bitcode_generation.started = false;
            self.runtime.hide_editor();
            self.runtime.set_step(VerificationStep::SymbolicExecution);
        }

        self.runtime.commit_if_changed(next)?;
        Ok(())
    }

    /// Fetches the latest generation report and merges it in. A `FAILED:`
    /// marker in the text raises a failed-verification-step event.
    pub async fn poll_report(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_report(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the LLVM bitcode generation report.",
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
            .stage_report(Stage::LlvmBitcodeGeneration, &project.id)
            .await?;
        if report.messages.is_none() || report.error.is_some() {
            return Ok(());
        }

        let messages = report.messages.clone().unwrap_or_default();
        let mut stored = report.to_value();
        if let Some(fields) = stored.as_object_mut() {
            // Two trailing line feeds keep consecutive report chunks apart
            // in the panel.
            fields.insert("messages".into(), Value::String(format!("{messages}\n\n")));
        }

        let mut next = project.clone();
        next.llvm_bitcode_generation.report = stored;
        self.runtime.commit_if_changed(next)?;

        if messages.contains("FAILED:") {
            self.runtime
                .events()
                .emit(VerificationEvent::FailedVerificationStep { error: messages });
        }
        Ok(())
    }

    /// Clears the stage flags back to their initial values and re-upserts.
    /// Returns the committed snapshot.
    pub fn reset(&self, project: &Project) -> Project {
        let mut next = project.clone();
        next.llvm_bitcode_generation.reset();
        self.runtime.upsert_project(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn runtime() -> Arc<Runtime> {
        Arc::new(Runtime::new(ApiConfig::with_base_url("http://localhost:3000")).unwrap())
    }

    #[test]
    fn not_eligible_without_a_valid_project_id() {
        let controller = LlvmBitcodeGeneration::new(runtime());
        assert!(!controller.can_run());
    }

    #[test]
    fn not_eligible_while_selected_revision_is_missing() {
        let runtime = runtime();
        runtime.set_project_id("p1", Some(77));
        let controller = LlvmBitcodeGeneration::new(Arc::clone(&runtime));
        // ProjectNotFound is absorbed into a plain `false`, never logged.
        assert!(!controller.can_run());
        assert!(runtime.last_error().is_none());
    }

    #[test]
    fn eligible_only_while_neither_started_nor_done() {
        let runtime = runtime();
        let controller = LlvmBitcodeGeneration::new(Arc::clone(&runtime));

        let mut project = Project::new("p1", 1, "wallet", "");
        runtime.upsert_project(project.clone());
        runtime.set_project_id("p1", Some(1));
        assert!(controller.can_run());

        project.llvm_bitcode_generation.started = true;
        runtime.upsert_project(project.clone());
        assert!(!controller.can_run());

        project.llvm_bitcode_generation.started = false;
        project.llvm_bitcode_generation.done = true;
        runtime.upsert_project(project);
        assert!(!controller.can_run());
    }

    #[test]
    fn reset_restores_eligibility_after_completion() {
        let runtime = runtime();
        let controller = LlvmBitcodeGeneration::new(Arc::clone(&runtime));

        let mut project = Project::new("p1", 1, "wallet", "");
        project.llvm_bitcode_generation.done = true;
        runtime.upsert_project(project.clone());
        runtime.set_project_id("p1", Some(1));
        assert!(!controller.can_run());

        controller.reset(&project);
        assert!(controller.can_run());
    }
}
