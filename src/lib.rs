pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod poller;
pub mod report;
pub mod runtime;
pub mod source;
pub mod step;

pub use crucible_common::{Project, Stage, StageState, VerificationStep};
