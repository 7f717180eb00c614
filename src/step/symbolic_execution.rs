//! Symbolic execution stage controller.
//!
//! Besides the common start/poll/reset shape this stage accumulates extra
//! command-line flags and exposes a deterministic preview of the exact
//! KLEE invocation the remote worker will run.

use std::sync::{Arc, Mutex, PoisonError};

use crucible_common::{Project, Stage};
use serde_json::Value;

use crate::errors::RuntimeError;
use crate::events::{NoticeLevel, VerificationEvent};
use crate::runtime::Runtime;

pub struct SymbolicExecution {
    runtime: Arc<Runtime>,
    command_flags: Mutex<String>,
}

impl SymbolicExecution {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            command_flags: Mutex::new(String::new()),
        }
    }

    // ── Flags and command preview ─────────────────────────────────────

    pub fn flags(&self) -> String {
        self.command_flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_additional_flags(&self, flags: &str) {
        *self
            .command_flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = flags.to_string();
    }

    /// The exact invocation the remote worker will run. Deterministic:
    /// without extra flags the baseline default-flags form, otherwise the
    /// trimmed flags interpolated into the fixed template.
    pub fn command_preview(&self, project_id: &str) -> String {
        let flags = self.flags();
        if flags.is_empty() {
            return format!(
                "klee --libc=klee --silent-klee-assume --warnings-only-to-file {project_id}.bc"
            );
        }

        format!("klee --libc=klee {} {project_id}.bc", flags.trim())
    }

    // ── Eligibility ───────────────────────────────────────────────────

    /// Eligible once bitcode generation finished and no symbolic execution
    /// has started yet. Never raises.
    pub fn can_run(&self) -> bool {
        match self.runtime.active_project() {
            Ok(Some(project)) => {
                project.llvm_bitcode_generation.done && !project.symbolic_execution.started
            }
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

    /// True while an execution is in flight for the active project.
    pub fn is_running(&self) -> bool {
        if !self.runtime.is_project_id_valid() {
            return false;
        }
        match self.runtime.active_project() {
            Ok(Some(project)) => {
                project.symbolic_execution.started && !project.symbolic_execution.done
            }
            _ => false,
        }
    }

    // ── Actions ───────────────────────────────────────────────────────

    /// Triggers symbolic execution with the accumulated flags.
    pub async fn start(&self, project: &Project) -> Result<bool, RuntimeError> {
        self.runtime.hide_editor();
        let _ = self.runtime.hide_report(Stage::LlvmBitcodeGeneration);
        let _ = self.runtime.show_report(Stage::SymbolicExecution);

        match self.try_start(project).await {
            Ok(accepted) => Ok(accepted),
            Err(err) if err.is_project_not_found() => Ok(false),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to run the symbolic execution.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }

    async fn try_start(&self, project: &Project) -> Result<bool, RuntimeError> {
        let flags = self.flags().trim().to_string();
        let ack = self
            .runtime
            .api()
            .start_stage(Stage::SymbolicExecution, &project.id, Some(&flags))
            .await?;
        if !ack.is_success() {
            self.runtime.events().notify(
                NoticeLevel::Warning,
                "Warning",
                format!(
                    "Sorry, the symbolic execution has failed for project having id {}.",
                    project.id
                ),
            );
            return Ok(false);
        }

        self.runtime.events().notify(
            NoticeLevel::Success,
            "Success",
            format!(
                "Symbolic execution has been successfully triggered for project having id {}.\n{}",
                project.id,
                ack.message.as_deref().unwrap_or_default()
            ),
        );

        let mut next = project.clone();
        next.symbolic_execution.started = true;
        next.symbolic_execution.done = false;
        self.runtime.upsert_project(next);
        Ok(true)
    }

    /// Fetches execution progress. Completion flips `started` off, unlocks
    /// the reset button and always commits; otherwise the snapshot is
    /// committed only on change.
    pub async fn poll_progress(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_progress(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the symbolic execution progress.",
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
            .stage_progress(Stage::SymbolicExecution, &project.id)
            .await?;
        if progress.is_failure_shaped() {
            return Ok(());
        }

        let done = progress.is_exited();
        let mut next = project.clone();
        next.symbolic_execution.progress = progress.to_value();
        next.symbolic_execution.done = done;

        let _ = self.poll_report(project).await;
        if let Some(active) = self.runtime.active_project()? {
            next.symbolic_execution.report = active.symbolic_execution.report;
        }

        if done {
            next.symbolic_execution.started = false;
            self.runtime.unlock_reset_button();
            self.runtime.upsert_project(next);
        } else {
            self.runtime.commit_if_changed(next)?;
        }
        Ok(())
    }

    /// Fetches the execution report, committing only when the report text
    /// actually changed.
    pub async fn poll_report(&self, project: &Project) -> Result<(), RuntimeError> {
        match self.try_poll_report(project).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_project_not_found() => Ok(()),
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to poll the symbolic execution report.",
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
            .stage_report(Stage::SymbolicExecution, &project.id)
            .await?;
        if report.messages.is_none() || report.error.is_some() {
            return Ok(());
        }

        let incoming = report.to_value();
        let current = self
            .runtime
            .active_project()?
            .map(|active| active.symbolic_execution.report)
            .unwrap_or(Value::Null);

        if incoming != current {
            let mut next = project.clone();
            next.symbolic_execution.report = incoming;
            self.runtime.upsert_project(next);
        }

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
        next.symbolic_execution.reset();
        self.runtime.upsert_project(next.clone());
        next
    }
}
