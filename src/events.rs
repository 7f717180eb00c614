//! Fire-and-forget event bus decoupling the controllers from whatever
//! renders notifications and panel toggles.
//!
//! Events are a closed enum dispatched over a tokio broadcast channel.
//! Subscribers own their receiver; dropping it unsubscribes. Emitting with
//! no live subscriber is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crucible_common::VerificationStep;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum VerificationEvent {
    /// A stage failed, either through an exception during polling or a
    /// `FAILED:` marker in a report.
    FailedVerificationStep { error: String },
    /// The whole runtime was (or must be) reset.
    ResetVerificationRuntime,
    /// A report panel toggle was requested for a step.
    ReportToggleRequested { step: VerificationStep },
    /// Bitcode generation completed; symbolic execution may begin.
    SymbolicExecutionRequested,
    /// Program verification completed; its result view may be shown.
    ProgramVerificationRequested,
    /// The editor should be brought back into view.
    ShowEditorRequested,
    /// The user asked to clear the whole project history.
    ClearHistoryRequested,
    /// User-facing notification.
    Notice {
        level: NoticeLevel,
        title: String,
        text: String,
    },
}

/// Broadcast bus for [`VerificationEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VerificationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Sends an event to all current subscribers, if any.
    pub fn emit(&self, event: VerificationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VerificationEvent> {
        self.tx.subscribe()
    }

    pub fn notify(&self, level: NoticeLevel, title: impl Into<String>, text: impl Into<String>) {
        self.emit(VerificationEvent::Notice {
            level,
            title: title.into(),
            text: text.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
