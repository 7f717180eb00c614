//! Steps and stages of the verification pipeline.
//!
//! A *step* is a position of the session-wide sequencer pointer; a *stage*
//! is one of the four remotely executed phases that can be started, polled
//! and reset. Every stage maps onto a step, but the initial `uploadSource`
//! step has no remote stage behind it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote job status sentinels carried in the `raw_status` field of
/// progress responses.
pub mod progress {
    /// The remote job is still running.
    pub const RUNNING: &str = "running";
    /// The remote job has terminated. Success and failure are
    /// indistinguishable at this layer; the report text is inspected for
    /// the `FAILED:` marker to tell them apart.
    pub const EXITED: &str = "exited";
}

/// An unrecognized step reached a dispatch site. This is an invariant
/// violation and always propagates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Sorry, step {step} is unexpected.")]
pub struct UnexpectedStep {
    pub step: String,
}

impl UnexpectedStep {
    pub fn new(step: impl Into<String>) -> Self {
        Self { step: step.into() }
    }
}

/// Position of the sequencer pointer. Exactly one value is live per
/// session, scoped to the whole session rather than to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStep {
    #[serde(rename = "uploadSource")]
    UploadSource,
    #[serde(rename = "sourceRestoration")]
    SourceRestoration,
    #[serde(rename = "llvmBitcodeGeneration")]
    LlvmBitcodeGeneration,
    #[serde(rename = "symbolicExecution")]
    SymbolicExecution,
    #[serde(rename = "programVerification")]
    ProgramVerification,
}

impl VerificationStep {
    /// The wire/display name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStep::UploadSource => "uploadSource",
            VerificationStep::SourceRestoration => "sourceRestoration",
            VerificationStep::LlvmBitcodeGeneration => "llvmBitcodeGeneration",
            VerificationStep::SymbolicExecution => "symbolicExecution",
            VerificationStep::ProgramVerification => "programVerification",
        }
    }

    /// The remote stage behind this step, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            VerificationStep::UploadSource => None,
            VerificationStep::SourceRestoration => Some(Stage::SourceRestoration),
            VerificationStep::LlvmBitcodeGeneration => Some(Stage::LlvmBitcodeGeneration),
            VerificationStep::SymbolicExecution => Some(Stage::SymbolicExecution),
            VerificationStep::ProgramVerification => Some(Stage::ProgramVerification),
        }
    }
}

impl fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStep {
    type Err = UnexpectedStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploadSource" => Ok(VerificationStep::UploadSource),
            "sourceRestoration" => Ok(VerificationStep::SourceRestoration),
            "llvmBitcodeGeneration" => Ok(VerificationStep::LlvmBitcodeGeneration),
            "symbolicExecution" => Ok(VerificationStep::SymbolicExecution),
            "programVerification" => Ok(VerificationStep::ProgramVerification),
            other => Err(UnexpectedStep::new(other)),
        }
    }
}

/// One of the four remotely executed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "sourceRestoration")]
    SourceRestoration,
    #[serde(rename = "llvmBitcodeGeneration")]
    LlvmBitcodeGeneration,
    #[serde(rename = "symbolicExecution")]
    SymbolicExecution,
    #[serde(rename = "programVerification")]
    ProgramVerification,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 4] = [
        Stage::SourceRestoration,
        Stage::LlvmBitcodeGeneration,
        Stage::SymbolicExecution,
        Stage::ProgramVerification,
    ];

    /// The URL path segment of this stage's remote routes.
    pub fn route_segment(&self) -> &'static str {
        match self {
            Stage::SourceRestoration => "source-restoration",
            Stage::LlvmBitcodeGeneration => "llvm-bitcode-generation",
            Stage::SymbolicExecution => "symbolic-execution",
            Stage::ProgramVerification => "program-verification",
        }
    }

    /// The sequencer step this stage corresponds to.
    pub fn step(&self) -> VerificationStep {
        match self {
            Stage::SourceRestoration => VerificationStep::SourceRestoration,
            Stage::LlvmBitcodeGeneration => VerificationStep::LlvmBitcodeGeneration,
            Stage::SymbolicExecution => VerificationStep::SymbolicExecution,
            Stage::ProgramVerification => VerificationStep::ProgramVerification,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step().as_str())
    }
}
