//! Polling engine.
//!
//! One repeating timer per (session, stage), fixed 1000 ms period. Each
//! tick walks a guard ladder before doing any work:
//!
//! 1. resolve the active project — a missing revision is the expected
//!    trace of a concurrent reset, so the tick is skipped and the timer
//!    keeps running;
//! 2. early-return while the stage's started precondition does not hold,
//!    so the remote endpoint is never hammered before the start action
//!    landed in the store;
//! 3. once the stage is done, stop the timer for good, optionally
//!    emitting the downstream "requested" event;
//! 4. otherwise poll the controller. A controller error stops the timer
//!    and raises a failed-verification-step event — polling never resumes
//!    on its own after a real failure.
//!
//! Starting a stage that is already polling first aborts the previous
//! task, so exactly one timer handle exists per stage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crucible_common::{Project, Stage};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::VerificationEvent;
use crate::runtime::Runtime;
use crate::step::VerificationSteps;

/// Fixed polling period.
pub const POLL_PERIOD: Duration = Duration::from_millis(1000);

pub struct PollingEngine {
    steps: Arc<VerificationSteps>,
    period: Duration,
    handles: Mutex<HashMap<Stage, JoinHandle<()>>>,
}

impl PollingEngine {
    pub fn new(steps: Arc<VerificationSteps>) -> Self {
        Self {
            steps,
            period: POLL_PERIOD,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the polling period (tests shorten it).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Starts polling a stage. Any previous timer for the same stage is
    /// cleared first, keeping the start idempotent.
    pub fn start(&self, stage: Stage) {
        let mut handles = self.handles();
        if let Some(previous) = handles.remove(&stage) {
            previous.abort();
        }

        debug!(stage = %stage, "polling started");
        let steps = Arc::clone(&self.steps);
        let period = self.period;
        handles.insert(stage, tokio::spawn(poll_stage(steps, stage, period)));
    }

    /// Clears the timer for a stage. An in-flight tick is cancelled at its
    /// next await point; a stage without a timer is a no-op.
    pub fn stop(&self, stage: Stage) {
        if let Some(handle) = self.handles().remove(&stage) {
            debug!(stage = %stage, "polling stopped");
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        let mut handles = self.handles();
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }

    /// Whether a timer is currently live for the stage.
    pub fn is_polling(&self, stage: Stage) -> bool {
        self.handles()
            .get(&stage)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<Stage, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn poll_stage(steps: Arc<VerificationSteps>, stage: Stage, period: Duration) {
    let runtime = Arc::clone(steps.runtime());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let project = match runtime.active_project() {
            Ok(Some(project)) => project,
            // Nothing selected yet; keep ticking.
            Ok(None) => continue,
            // The project was reset or cleared mid-flight; keep ticking.
            Err(err) if err.is_project_not_found() => continue,
            Err(err) => {
                emit_failure(&runtime, &err.to_string());
                return;
            }
        };

        if !started_precondition(&project, stage) {
            continue;
        }

        if steps.is_step_successful(&project, stage) {
            if let Some(event) = completion_event(stage) {
                runtime.events().emit(event);
            }
            debug!(stage = %stage, "polling finished, stage done");
            return;
        }

        let outcome = match stage {
            Stage::SourceRestoration => steps.source_restoration().poll_progress(&project).await,
            Stage::LlvmBitcodeGeneration => {
                steps.llvm_bitcode_generation().poll_progress(&project).await
            }
            Stage::SymbolicExecution => steps.symbolic_execution().poll_progress(&project).await,
            Stage::ProgramVerification => {
                steps.program_verification().poll_progress(&project).await
            }
        };

        if let Err(err) = outcome {
            emit_failure(&runtime, &err.to_string());
            return;
        }
    }
}

fn emit_failure(runtime: &Runtime, error: &str) {
    runtime
        .events()
        .emit(VerificationEvent::FailedVerificationStep {
            error: error.to_string(),
        });
}

/// Whether the stage's start has taken effect in the store. Symbolic
/// execution additionally requires bitcode generation to be settled.
fn started_precondition(project: &Project, stage: Stage) -> bool {
    match stage {
        Stage::SymbolicExecution => {
            let bitcode = project.stage(Stage::LlvmBitcodeGeneration);
            !bitcode.started && bitcode.done && project.symbolic_execution.started
        }
        _ => project.stage(stage).started,
    }
}

/// The downstream event a completed stage requests, if any.
fn completion_event(stage: Stage) -> Option<VerificationEvent> {
    match stage {
        Stage::LlvmBitcodeGeneration => Some(VerificationEvent::SymbolicExecutionRequested),
        Stage::ProgramVerification => Some(VerificationEvent::ProgramVerificationRequested),
        Stage::SourceRestoration | Stage::SymbolicExecution => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn engine() -> PollingEngine {
        let runtime =
            Arc::new(Runtime::new(ApiConfig::with_base_url("http://localhost:3000")).unwrap());
        PollingEngine::new(Arc::new(VerificationSteps::new(runtime)))
    }

    #[test]
    fn symbolic_execution_waits_for_settled_bitcode() {
        let mut project = Project::new("p1", 1, "wallet", "");
        project.symbolic_execution.started = true;
        assert!(!started_precondition(&project, Stage::SymbolicExecution));

        project.llvm_bitcode_generation.done = true;
        assert!(started_precondition(&project, Stage::SymbolicExecution));

        project.llvm_bitcode_generation.started = true;
        assert!(!started_precondition(&project, Stage::SymbolicExecution));
    }

    #[test]
    fn other_stages_only_need_their_own_started_flag() {
        let mut project = Project::new("p1", 1, "wallet", "");
        for stage in [
            Stage::SourceRestoration,
            Stage::LlvmBitcodeGeneration,
            Stage::ProgramVerification,
        ] {
            assert!(!started_precondition(&project, stage));
            project.stage_mut(stage).started = true;
            assert!(started_precondition(&project, stage));
        }
    }

    #[test]
    fn completion_events_cover_bitcode_and_verification_only() {
        assert_eq!(
            completion_event(Stage::LlvmBitcodeGeneration),
            Some(VerificationEvent::SymbolicExecutionRequested)
        );
        assert_eq!(
            completion_event(Stage::ProgramVerification),
            Some(VerificationEvent::ProgramVerificationRequested)
        );
        assert_eq!(completion_event(Stage::SourceRestoration), None);
        assert_eq!(completion_event(Stage::SymbolicExecution), None);
    }

    #[tokio::test]
    async fn start_is_idempotent_per_stage() {
        let engine = engine();
        engine.start(Stage::LlvmBitcodeGeneration);
        engine.start(Stage::LlvmBitcodeGeneration);
        assert!(engine.is_polling(Stage::LlvmBitcodeGeneration));
        assert_eq!(engine.handles().len(), 1);
        engine.stop(Stage::LlvmBitcodeGeneration);
        assert!(!engine.is_polling(Stage::LlvmBitcodeGeneration));
    }

    #[tokio::test]
    async fn stop_all_clears_every_handle() {
        let engine = engine();
        for stage in Stage::ALL {
            engine.start(stage);
        }
        engine.stop_all();
        for stage in Stage::ALL {
            assert!(!engine.is_polling(stage));
        }
    }
}
