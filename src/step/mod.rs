//! Verification step sequencer.
//!
//! Owns the stage controllers and the composite operations spanning them:
//! step eligibility, runtime reset, history clearing and revision revert.
//! The sequencer pointer itself and the reset-button lock live on the
//! shared [`Runtime`] so every collaborator observes the same values.

pub mod llvm_bitcode_generation;
pub mod program_verification;
pub mod source_restoration;
pub mod symbolic_execution;
pub mod upload_source;

use std::sync::Arc;

use crucible_common::{Project, Stage, UnexpectedStep, VerificationStep, progress};

use crate::errors::RuntimeError;
use crate::events::{NoticeLevel, VerificationEvent};
use crate::runtime::Runtime;
use crate::source::decode_source;

pub use llvm_bitcode_generation::LlvmBitcodeGeneration;
pub use program_verification::ProgramVerification;
pub use source_restoration::SourceRestoration;
pub use symbolic_execution::SymbolicExecution;
pub use upload_source::UploadSource;

pub struct VerificationSteps {
    runtime: Arc<Runtime>,
    /// Stage whose completion gates the runtime reset.
    terminal_stage: Stage,
    upload_source: UploadSource,
    source_restoration: SourceRestoration,
    llvm_bitcode_generation: LlvmBitcodeGeneration,
    symbolic_execution: SymbolicExecution,
    program_verification: ProgramVerification,
}

impl VerificationSteps {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            upload_source: UploadSource::new(Arc::clone(&runtime)),
            source_restoration: SourceRestoration::new(Arc::clone(&runtime)),
            llvm_bitcode_generation: LlvmBitcodeGeneration::new(Arc::clone(&runtime)),
            symbolic_execution: SymbolicExecution::new(Arc::clone(&runtime)),
            program_verification: ProgramVerification::new(Arc::clone(&runtime)),
            terminal_stage: Stage::LlvmBitcodeGeneration,
            runtime,
        }
    }

    /// Overrides which stage's completion unlocks the runtime reset.
    pub fn with_terminal_stage(mut self, stage: Stage) -> Self {
        self.terminal_stage = stage;
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn upload_source(&self) -> &UploadSource {
        &self.upload_source
    }

    pub fn source_restoration(&self) -> &SourceRestoration {
        &self.source_restoration
    }

    pub fn llvm_bitcode_generation(&self) -> &LlvmBitcodeGeneration {
        &self.llvm_bitcode_generation
    }

    pub fn symbolic_execution(&self) -> &SymbolicExecution {
        &self.symbolic_execution
    }

    pub fn program_verification(&self) -> &ProgramVerification {
        &self.program_verification
    }

    /// The step the pipeline expects to run next.
    pub fn next_step(&self) -> VerificationStep {
        self.runtime.current_step()
    }

    /// Unlocks the reset button and records the failure.
    pub fn report_error(&self, error: &RuntimeError) {
        self.runtime.unlock_reset_button();
        self.runtime.push_error(error);
    }

    // ── Eligibility ───────────────────────────────────────────────────

    /// Whether `step` can run right now, composed from the owning
    /// controller's eligibility predicate.
    pub fn can_run_step(&self, step: VerificationStep) -> bool {
        match step {
            VerificationStep::UploadSource => self.upload_source.can_upload(),
            VerificationStep::SourceRestoration => self.source_restoration.can_run(),
            VerificationStep::LlvmBitcodeGeneration => self.llvm_bitcode_generation.can_run(),
            VerificationStep::SymbolicExecution => self.symbolic_execution.can_run(),
            VerificationStep::ProgramVerification => self.program_verification.can_run(),
        }
    }

    /// Whether the runtime reset is available: nothing runnable from the
    /// start of the pipeline, an active project that resolved, its
    /// terminal stage done, and the reset button unlocked.
    pub fn can_reset_runtime(&self) -> bool {
        let step_remaining = self.can_run_step(VerificationStep::UploadSource)
            || self.can_run_step(VerificationStep::LlvmBitcodeGeneration);
        if step_remaining {
            return false;
        }
        if !self.runtime.is_project_id_valid() {
            return false;
        }

        match self.runtime.active_project() {
            Ok(Some(project)) => {
                project.stage(self.terminal_stage).done && !self.runtime.is_reset_button_locked()
            }
            Ok(None) => false,
            Err(err) if err.is_project_not_found() => false,
            Err(err) => {
                self.runtime.push_error(&err);
                false
            }
        }
    }

    // ── Stage predicates ──────────────────────────────────────────────

    /// Whether the stage reached its committed done state.
    pub fn is_step_successful(&self, project: &Project, stage: Stage) -> bool {
        project.stage(stage).done
    }

    /// Whether the last polled progress reports a terminated remote job.
    pub fn is_progress_completed(&self, project: &Project, stage: Stage) -> bool {
        project
            .stage(stage)
            .progress
            .get("raw_status")
            .and_then(|status| status.as_str())
            .is_some_and(|status| status == progress::EXITED)
    }

    // ── Reports ───────────────────────────────────────────────────────

    /// The report text of `step` for a project; empty for the upload step.
    pub fn step_report(&self, project: &Project, step: VerificationStep) -> String {
        match step {
            VerificationStep::UploadSource => String::new(),
            VerificationStep::SourceRestoration => {
                project.source_restoration.report_raw_log().to_string()
            }
            VerificationStep::LlvmBitcodeGeneration => {
                project.llvm_bitcode_generation.report_messages().to_string()
            }
            VerificationStep::SymbolicExecution => {
                project.symbolic_execution.report_messages().to_string()
            }
            VerificationStep::ProgramVerification => {
                project.program_verification.report_messages().to_string()
            }
        }
    }

    pub fn is_report_visible(&self, step: VerificationStep) -> Result<bool, RuntimeError> {
        self.runtime.is_report_visible(Self::panel_stage(step)?)
    }

    /// Shows or hides the step's report panel depending on its current
    /// visibility. Steps without a panel raise `UnexpectedStep`.
    pub fn toggle_report_visibility(&self, step: VerificationStep) -> Result<(), RuntimeError> {
        let stage = Self::panel_stage(step)?;
        if self.runtime.is_report_visible(stage)? {
            self.runtime.hide_report(stage)
        } else {
            self.runtime.show_report(stage)
        }
    }

    /// Emits the bus event a report toggle is wired to.
    pub fn request_report_toggle(&self, step: VerificationStep) -> Result<(), RuntimeError> {
        Self::panel_stage(step)?;
        self.runtime
            .events()
            .emit(VerificationEvent::ReportToggleRequested { step });
        Ok(())
    }

    fn panel_stage(step: VerificationStep) -> Result<Stage, RuntimeError> {
        match step {
            VerificationStep::LlvmBitcodeGeneration => Ok(Stage::LlvmBitcodeGeneration),
            VerificationStep::SymbolicExecution => Ok(Stage::SymbolicExecution),
            VerificationStep::ProgramVerification => Ok(Stage::ProgramVerification),
            VerificationStep::UploadSource | VerificationStep::SourceRestoration => {
                Err(UnexpectedStep::new(step.as_str()).into())
            }
        }
    }

    // ── Composite operations ──────────────────────────────────────────

    /// Resets the whole verification runtime: re-enables upload, shows the
    /// editor, hides every report panel, drops the selection, rewinds the
    /// sequencer, locks the reset button and clears the per-stage flags of
    /// every stored project.
    pub fn reset_verification_runtime(&self) {
        self.runtime.enable_source_upload();
        self.runtime.show_editor();
        self.runtime.hide_all_reports();
        self.runtime.clear_project_id();
        self.runtime.set_step(VerificationStep::UploadSource);
        self.runtime.lock_reset_button();
        self.reset_projects();
    }

    /// Cascades every controller's reset over every stored project. Each
    /// reset returns the committed snapshot so the four compose instead of
    /// clobbering one another.
    pub fn reset_projects(&self) {
        for project in self.runtime.all_projects() {
            let project = self.source_restoration.reset(&project);
            let project = self.llvm_bitcode_generation.reset(&project);
            let project = self.symbolic_execution.reset(&project);
            self.program_verification.reset(&project);
        }
    }

    /// Empties the project history and resets the runtime.
    pub fn empty_history(&self) {
        self.runtime.clear_projects();
        self.reset_verification_runtime();
    }

    /// Reverts the editor to a stored revision, returning its decoded
    /// source. An unknown revision is a user-visible warning, not an
    /// error; newer revisions are kept.
    pub fn revert_to_revision(&self, revision: i64) -> Result<Option<String>, RuntimeError> {
        let project = match self.runtime.project_by_revision(revision) {
            Ok(project) => project,
            Err(err) if err.is_project_not_found() => {
                self.runtime.events().notify(
                    NoticeLevel::Warning,
                    "Warning",
                    "Impossible to revert to this revision.",
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let decoded = decode_source(&project.source)?;
        self.runtime.set_encoded_source(&project.source);
        self.runtime.set_project_name(&project.name);
        self.runtime
            .set_project_id(&project.id, Some(project.revision));
        self.runtime
            .events()
            .emit(VerificationEvent::ResetVerificationRuntime);
        Ok(Some(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::source::encode_source;
    use serde_json::json;

    fn steps() -> VerificationSteps {
        let runtime =
            Arc::new(Runtime::new(ApiConfig::with_base_url("http://localhost:3000")).unwrap());
        VerificationSteps::new(runtime)
    }

    fn completed_project(revision: i64) -> Project {
        let mut project = Project::new("p1", revision, "wallet", "");
        project.source_restoration.done = true;
        project.llvm_bitcode_generation.done = true;
        project
    }

    // =========================================
    // Eligibility composition
    // =========================================

    #[test]
    fn only_entry_steps_are_runnable_initially() {
        let steps = steps();
        assert!(steps.can_run_step(VerificationStep::UploadSource));
        assert!(steps.can_run_step(VerificationStep::SourceRestoration));
        assert!(!steps.can_run_step(VerificationStep::LlvmBitcodeGeneration));
        assert!(!steps.can_run_step(VerificationStep::SymbolicExecution));
        assert!(!steps.can_run_step(VerificationStep::ProgramVerification));
    }

    // =========================================
    // Runtime reset availability
    // =========================================

    #[test]
    fn reset_unavailable_while_upload_is_still_enabled() {
        let steps = steps();
        assert!(!steps.can_reset_runtime());
    }

    #[test]
    fn reset_needs_terminal_stage_done_and_unlocked_button() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());
        runtime.disable_source_upload();

        let project = completed_project(1);
        runtime.upsert_project(project.clone());
        runtime.set_project_id("p1", Some(1));

        // Terminal stage done, but the button is still locked.
        assert!(!steps.can_reset_runtime());
        runtime.unlock_reset_button();
        assert!(steps.can_reset_runtime());
    }

    #[test]
    fn reset_availability_can_gate_on_program_verification() {
        let runtime =
            Arc::new(Runtime::new(ApiConfig::with_base_url("http://localhost:3000")).unwrap());
        let steps = VerificationSteps::new(Arc::clone(&runtime))
            .with_terminal_stage(Stage::ProgramVerification);
        runtime.disable_source_upload();
        runtime.unlock_reset_button();

        let mut project = completed_project(1);
        runtime.upsert_project(project.clone());
        runtime.set_project_id("p1", Some(1));
        assert!(!steps.can_reset_runtime());

        project.program_verification.done = true;
        runtime.upsert_project(project);
        assert!(steps.can_reset_runtime());
    }

    #[test]
    fn reset_swallows_not_found_and_stays_unavailable() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());
        runtime.disable_source_upload();
        runtime.unlock_reset_button();
        runtime.set_project_id("p1", Some(404));
        assert!(!steps.can_reset_runtime());
        assert!(runtime.last_error().is_none());
    }

    // =========================================
    // Report toggling
    // =========================================

    #[test]
    fn toggling_flips_visibility_both_ways() {
        let steps = steps();
        let step = VerificationStep::SymbolicExecution;
        assert!(!steps.is_report_visible(step).unwrap());
        steps.toggle_report_visibility(step).unwrap();
        assert!(steps.is_report_visible(step).unwrap());
        steps.toggle_report_visibility(step).unwrap();
        assert!(!steps.is_report_visible(step).unwrap());
    }

    #[test]
    fn steps_without_a_panel_raise_unexpected_step() {
        let steps = steps();
        for step in [
            VerificationStep::UploadSource,
            VerificationStep::SourceRestoration,
        ] {
            let err = steps.toggle_report_visibility(step).unwrap_err();
            assert!(matches!(err, RuntimeError::UnexpectedStep(_)));
        }
    }

    // =========================================
    // Stage predicates and report getters
    // =========================================

    #[test]
    fn progress_completion_follows_the_exited_sentinel() {
        let steps = steps();
        let mut project = Project::new("p1", 1, "wallet", "");
        assert!(!steps.is_progress_completed(&project, Stage::SymbolicExecution));

        project.symbolic_execution.progress = json!({"raw_status": "running"});
        assert!(!steps.is_progress_completed(&project, Stage::SymbolicExecution));

        project.symbolic_execution.progress = json!({"raw_status": "exited"});
        assert!(steps.is_progress_completed(&project, Stage::SymbolicExecution));
    }

    #[test]
    fn step_report_reads_the_right_field_per_step() {
        let steps = steps();
        let mut project = Project::new("p1", 1, "wallet", "");
        project.llvm_bitcode_generation.report = json!({"messages": "bitcode ok"});
        project.source_restoration.report = json!({"raw_log": "restored"});

        assert_eq!(
            steps.step_report(&project, VerificationStep::LlvmBitcodeGeneration),
            "bitcode ok"
        );
        assert_eq!(
            steps.step_report(&project, VerificationStep::SourceRestoration),
            "restored"
        );
        assert_eq!(steps.step_report(&project, VerificationStep::UploadSource), "");
    }

    // =========================================
    // Composite operations
    // =========================================

    #[test]
    fn runtime_reset_rewinds_everything() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());

        let mut project = completed_project(1);
        project.symbolic_execution.done = true;
        project.program_verification.report = json!({"messages": "verified"});
        runtime.upsert_project(project);
        runtime.set_project_id("p1", Some(1));
        runtime.disable_source_upload();
        runtime.hide_editor();
        runtime.show_report(Stage::SymbolicExecution).unwrap();
        runtime.set_step(VerificationStep::SymbolicExecution);
        runtime.unlock_reset_button();

        steps.reset_verification_runtime();

        assert!(runtime.is_source_upload_enabled());
        assert!(runtime.is_editor_visible());
        assert!(!runtime.is_report_visible(Stage::SymbolicExecution).unwrap());
        assert!(!runtime.is_project_id_valid());
        assert_eq!(runtime.current_step(), VerificationStep::UploadSource);
        assert!(runtime.is_reset_button_locked());

        // Every stage of the stored project went back to its initial state,
        // while the project itself survived.
        let stored = runtime.project_by_revision(1).unwrap();
        for stage in Stage::ALL {
            assert_eq!(*stored.stage(stage), Default::default());
        }
    }

    #[test]
    fn empty_history_drops_every_revision() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());
        runtime.upsert_project(completed_project(1));
        runtime.upsert_project(completed_project(2));
        steps.empty_history();
        assert!(runtime.is_history_empty());
        assert_eq!(runtime.current_step(), VerificationStep::UploadSource);
    }

    #[test]
    fn revert_restores_editor_state_and_fires_reset_event() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());
        let mut events = runtime.events().subscribe();

        let source = "mod wallet {\n}\n";
        let encoded = encode_source(source).unwrap();
        runtime.upsert_project(Project::new("p1", 7, "wallet", encoded.clone()));

        let decoded = steps.revert_to_revision(7).unwrap().unwrap();
        assert!(decoded.starts_with(source));

        let editor = runtime.editor();
        assert_eq!(editor.project_id, "p1");
        assert_eq!(editor.project_revision, 7);
        assert_eq!(editor.project_name, "wallet");
        assert_eq!(editor.base64_source, encoded);

        assert_eq!(
            events.try_recv().unwrap(),
            VerificationEvent::ResetVerificationRuntime
        );
    }

    #[test]
    fn revert_to_unknown_revision_warns_and_keeps_history() {
        let steps = steps();
        let runtime = Arc::clone(steps.runtime());
        let mut events = runtime.events().subscribe();
        runtime.upsert_project(completed_project(1));

        assert!(steps.revert_to_revision(999).unwrap().is_none());
        assert_eq!(runtime.all_projects().len(), 1);
        match events.try_recv().unwrap() {
            VerificationEvent::Notice { level, .. } => {
                assert_eq!(level, NoticeLevel::Warning);
            }
            other => panic!("Expected a warning notice, got {other:?}"),
        }
    }
}
