//! Program verification stage controller.
//!
//! The terminal, re-checkable stage: once the earlier stages completed it
//! can be run again after a reset without touching the rest of the
//! pipeline.

use std::sync::Arc;

use crucible_common::{Project, Stage};

use crate::errors::RuntimeError;
use crate::events::{NoticeLevel, VerificationEvent};
use crate::runtime::Runtime;

pub struct ProgramVerification {
    runtime: Arc<Runtime>,
}

impl ProgramVerification {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Pure eligibility predicate; never raises.
    pub fn can_run(&self) -> bool {
        if !self.runtime.is_project_id_valid() {
            return false;
        }
        match self.runtime.active_project() {
            Ok(Some(project)) => Self::can_verify_for(&project),
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

    fn can_verify_for(project: &Project) -> bool {
        // There is no ongoing program verification.
        let stage = project.stage(Stage::ProgramVerification);
        !stage.started && !stage.done
    }

    /// Triggers program verification for the project.
    pub async fn start(&self, project: &Project) -> Result<bool, RuntimeError> {
        self.runtime.hide_editor();
        let _ = self.runtime.show_report(Stage::ProgramVerification);

        match self.try_start(project).await {
            Ok(accepted) => Ok(accepted),
            Err(err) if err.is_project_not_found() => Ok(false),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to verify program.",
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
            .start_stage(Stage::ProgramVerification, &project.id, None)
            .await?;
        if !ack.is_success() {
            self.runtime.events().notify(
                NoticeLevel::Warning,
                "Warning",
                format!(
                    "Sorry, the program verification has failed for project having id {}.",
                    project.id
                ),
            );
            return Ok(false);
        }

        self.runtime.events().notify(
            NoticeLevel::Success,
            "Success",
            format!(
                "Program verification has been successfully triggered for project having id {}:\n{}",
                project.id,
                ack.message.as_deref().unwrap_or_default()
            ),
        );

        let mut next = project.clone();
        next.program_verification.started = true;
        self.runtime.upsert_project(next);
        Ok(true)
    }

    /// Fetches verification progress. Completion flips `started` off and
    /// unlocks the reset button.
    pub async fn poll_progress(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_progress(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the program verification progress.",
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
            .stage_progress(Stage::ProgramVerification, &project.id)
            .await?;
        if progress.is_failure_shaped() {
            return Ok(());
        }

        let done = progress.is_exited();
        let mut next = project.clone();
        next.program_verification.progress = progress.to_value();
        next.program_verification.done = done;

        let _ = self.poll_report(project).await;
        if let Some(active) = self.runtime.active_project()? {
            next.program_verification.report = active.program_verification.report;
        }

        if done {
            next.program_verification.started = false;
            self.runtime.unlock_reset_button();
        }

        self.runtime.commit_if_changed(next)?;
        Ok(())
    }

    /// Fetches the verification report; a `FAILED:` marker raises a
    /// failed-verification-step event carrying the report text.
    pub async fn poll_report(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_report(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the program verification report.",
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
            .stage_report(Stage::ProgramVerification, &project.id)
            .await?;
        if report.messages.is_none() || report.error.is_some() {
            return Ok(());
        }

        let mut next = project.clone();
        next.program_verification.report = report.to_value();
        self.runtime.commit_if_changed(next)?;

        let messages = report.messages.unwrap_or_default();
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
        next.program_verification.reset();
        self.runtime.upsert_project(next.clone());
        next
    }
}
