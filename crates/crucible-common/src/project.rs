//! The project entity and its per-stage sub-state.
//!
//! A `Project` is one immutable snapshot of a verification session, keyed
//! by `revision`. Updates never mutate a stored snapshot in place: stage
//! actions build a new value with the same revision and replace the prior
//! one in the history (last write wins per revision).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::Stage;

/// State of a single pipeline stage within a project snapshot.
///
/// `started` and `done` are never both true beyond the instant bridging a
/// start and the poll that observes completion: the poll that sees the
/// remote job exit flips `started` off in the same update that sets `done`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub done: bool,
    /// Latest progress payload as returned by the remote service.
    /// `Value::Null` until the first successful poll.
    #[serde(default)]
    pub progress: Value,
    /// Latest report payload. Carries a `messages` field (or `raw_log` for
    /// source restoration) plus whatever else the service sends.
    #[serde(default)]
    pub report: Value,
}

impl StageState {
    /// Clears the stage back to its initial values.
    pub fn reset(&mut self) {
        *self = StageState::default();
    }

    /// The human-readable report text, empty when none was fetched yet.
    pub fn report_messages(&self) -> &str {
        self.report
            .get("messages")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// The raw log text carried by source-restoration reports.
    pub fn report_raw_log(&self) -> &str {
        self.report
            .get("raw_log")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// One revision of a verification project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Server-assigned project id. An empty string means "none selected".
    pub id: String,
    /// Monotonic, timestamp-derived revision. Unique key within history.
    pub revision: i64,
    pub name: String,
    /// Project source, base64-encoded at rest.
    pub source: String,
    #[serde(default)]
    pub source_restoration: StageState,
    #[serde(default)]
    pub llvm_bitcode_generation: StageState,
    #[serde(default)]
    pub symbolic_execution: StageState,
    #[serde(default)]
    pub program_verification: StageState,
}

impl Project {
    /// Creates a fresh project with all stages at their initial state.
    pub fn new(
        id: impl Into<String>,
        revision: i64,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            revision,
            name: name.into(),
            source: source.into(),
            source_restoration: StageState::default(),
            llvm_bitcode_generation: StageState::default(),
            symbolic_execution: StageState::default(),
            program_verification: StageState::default(),
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::SourceRestoration => &self.source_restoration,
            Stage::LlvmBitcodeGeneration => &self.llvm_bitcode_generation,
            Stage::SymbolicExecution => &self.symbolic_execution,
            Stage::ProgramVerification => &self.program_verification,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::SourceRestoration => &mut self.source_restoration,
            Stage::LlvmBitcodeGeneration => &mut self.llvm_bitcode_generation,
            Stage::SymbolicExecution => &mut self.symbolic_execution,
            Stage::ProgramVerification => &mut self.program_verification,
        }
    }
}
