//! Shared runtime context.
//!
//! One `Runtime` value owns every mutable slice of session state — project
//! history, error log, editor selection, sequencer pointer, panel
//! visibility — behind a single mutex, and is passed explicitly
//! (`Arc<Runtime>`) to the stage controllers, the sequencer and the polling
//! engine. Mutation is whole-value replacement per project revision, so
//! readers never observe a partially updated snapshot.

pub mod editor;
pub mod history;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use crucible_common::{Project, Stage, UnexpectedStep, VerificationStep};
use tracing::debug;

use crate::client::ApiClient;
use crate::config::ApiConfig;
use crate::errors::RuntimeError;
use crate::events::EventBus;
use editor::EditorState;
use history::ProjectHistory;

/// One entry of the session error log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Sequencer slice: the session-wide step pointer and the reset lock.
#[derive(Debug, Clone, PartialEq)]
struct StepSlice {
    current: VerificationStep,
    reset_locked: bool,
}

impl Default for StepSlice {
    fn default() -> Self {
        Self {
            current: VerificationStep::UploadSource,
            reset_locked: true,
        }
    }
}

/// Visibility slice: the editor, the upload toggle and the three stage
/// report panels.
#[derive(Debug, Clone, PartialEq)]
struct PanelSlice {
    upload_enabled: bool,
    editor_visible: bool,
    llvm_report_visible: bool,
    symbolic_report_visible: bool,
    program_report_visible: bool,
}

impl Default for PanelSlice {
    fn default() -> Self {
        Self {
            upload_enabled: true,
            editor_visible: true,
            llvm_report_visible: false,
            symbolic_report_visible: false,
            program_report_visible: false,
        }
    }
}

#[derive(Debug, Default)]
struct RuntimeState {
    history: ProjectHistory,
    errors: Vec<ErrorEntry>,
    editor: EditorState,
    steps: StepSlice,
    panels: PanelSlice,
}

/// The shared runtime context.
pub struct Runtime {
    api: ApiClient,
    events: EventBus,
    state: Mutex<RuntimeState>,
}

impl Runtime {
    pub fn new(config: ApiConfig) -> Result<Self, RuntimeError> {
        Ok(Self {
            api: ApiClient::new(config)?,
            events: EventBus::new(),
            state: Mutex::new(RuntimeState::default()),
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// State is replaced whole on every mutation, so a panicked writer
    /// cannot leave a torn snapshot behind; recover the guard instead of
    /// propagating the poison.
    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Project history ───────────────────────────────────────────────

    pub fn upsert_project(&self, project: Project) {
        self.state().history.upsert(project);
    }

    pub fn project_by_revision(&self, revision: i64) -> Result<Project, RuntimeError> {
        self.state().history.by_revision(revision).cloned()
    }

    /// Resolves the active project from the current editor selection.
    ///
    /// `Ok(None)` is the expected steady state when no project is
    /// selected; `Err(ProjectNotFound)` is the anomaly of a selected
    /// revision missing from history.
    pub fn active_project(&self) -> Result<Option<Project>, RuntimeError> {
        let state = self.state();
        if !state.editor.is_project_id_valid() {
            return Ok(None);
        }
        state
            .history
            .by_revision(state.editor.project_revision)
            .map(|project| Some(project.clone()))
    }

    /// Commits a candidate snapshot only when it differs structurally from
    /// the current active project, suppressing redundant store churn.
    /// Returns whether a commit happened.
    pub fn commit_if_changed(&self, candidate: Project) -> Result<bool, RuntimeError> {
        let current = self.active_project()?;
        if current.as_ref() == Some(&candidate) {
            return Ok(false);
        }
        self.upsert_project(candidate);
        Ok(true)
    }

    pub fn all_projects(&self) -> Vec<Project> {
        self.state().history.all()
    }

    pub fn is_history_empty(&self) -> bool {
        self.state().history.is_empty()
    }

    pub fn clear_projects(&self) {
        self.state().history.clear();
    }

    pub fn remove_revision(&self, revision: i64) {
        self.state().history.remove_revision(revision);
    }

    // ── Error log ─────────────────────────────────────────────────────

    /// Appends to the unbounded session error log.
    pub fn push_error(&self, error: &RuntimeError) {
        debug!(error = %error, "error pushed to runtime log");
        self.state().errors.push(ErrorEntry {
            message: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn last_error(&self) -> Option<ErrorEntry> {
        self.state().errors.last().cloned()
    }

    pub fn error_count(&self) -> usize {
        self.state().errors.len()
    }

    // ── Editor selection ──────────────────────────────────────────────

    pub fn editor(&self) -> EditorState {
        self.state().editor.clone()
    }

    pub fn is_project_id_valid(&self) -> bool {
        self.state().editor.is_project_id_valid()
    }

    pub fn set_project_id(&self, project_id: &str, revision: Option<i64>) {
        self.state().editor.set_project_id(project_id, revision);
    }

    pub fn clear_project_id(&self) {
        self.state().editor.clear_project_id();
    }

    pub fn set_project_name(&self, name: &str) {
        self.state().editor.project_name = name.to_string();
    }

    pub fn set_encoded_source(&self, base64_source: &str) {
        self.state().editor.base64_source = base64_source.to_string();
    }

    // ── Sequencer slice ───────────────────────────────────────────────

    pub fn current_step(&self) -> VerificationStep {
        self.state().steps.current
    }

    /// Unconditional overwrite of the step pointer.
    pub fn set_step(&self, step: VerificationStep) {
        debug!(step = %step, "verification step set");
        self.state().steps.current = step;
    }

    pub fn lock_reset_button(&self) {
        self.state().steps.reset_locked = true;
    }

    pub fn unlock_reset_button(&self) {
        self.state().steps.reset_locked = false;
    }

    pub fn is_reset_button_locked(&self) -> bool {
        self.state().steps.reset_locked
    }

    // ── Panels ────────────────────────────────────────────────────────

    pub fn is_source_upload_enabled(&self) -> bool {
        self.state().panels.upload_enabled
    }

    pub fn enable_source_upload(&self) {
        self.state().panels.upload_enabled = true;
    }

    pub fn disable_source_upload(&self) {
        self.state().panels.upload_enabled = false;
    }

    pub fn is_editor_visible(&self) -> bool {
        self.state().panels.editor_visible
    }

    pub fn show_editor(&self) {
        self.state().panels.editor_visible = true;
    }

    pub fn hide_editor(&self) {
        self.state().panels.editor_visible = false;
    }

    pub fn is_report_visible(&self, stage: Stage) -> Result<bool, RuntimeError> {
        let state = self.state();
        match stage {
            Stage::LlvmBitcodeGeneration => Ok(state.panels.llvm_report_visible),
            Stage::SymbolicExecution => Ok(state.panels.symbolic_report_visible),
            Stage::ProgramVerification => Ok(state.panels.program_report_visible),
            Stage::SourceRestoration => {
                Err(UnexpectedStep::new(stage.step().as_str()).into())
            }
        }
    }

    pub fn show_report(&self, stage: Stage) -> Result<(), RuntimeError> {
        self.set_report_visibility(stage, true)
    }

    pub fn hide_report(&self, stage: Stage) -> Result<(), RuntimeError> {
        self.set_report_visibility(stage, false)
    }

    /// Hides every stage report panel at once (runtime reset).
    pub fn hide_all_reports(&self) {
        let mut state = self.state();
        state.panels.llvm_report_visible = false;
        state.panels.symbolic_report_visible = false;
        state.panels.program_report_visible = false;
    }

    fn set_report_visibility(&self, stage: Stage, visible: bool) -> Result<(), RuntimeError> {
        let mut state = self.state();
        match stage {
            Stage::LlvmBitcodeGeneration => state.panels.llvm_report_visible = visible,
            Stage::SymbolicExecution => state.panels.symbolic_report_visible = visible,
            Stage::ProgramVerification => state.panels.program_report_visible = visible,
            Stage::SourceRestoration => {
                return Err(UnexpectedStep::new(stage.step().as_str()).into());
            }
        }
        Ok(())
    }
}
