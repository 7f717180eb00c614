//! Upload-source step: ships the edited source to the service.
//!
//! This is the entry step of the pipeline. It owns no remote job of its
//! own — the service only acknowledges the upload — so there is nothing to
//! poll and no per-stage flags on the project. Availability is a simple
//! toggle that the source-restoration step flips off once a project
//! exists.

use std::sync::Arc;

use crate::errors::RuntimeError;
use crate::events::NoticeLevel;
use crate::runtime::Runtime;

pub struct UploadSource {
    runtime: Arc<Runtime>,
}

impl UploadSource {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Upload stays available until a restoration succeeds or the runtime
    /// is reset.
    pub fn can_upload(&self) -> bool {
        self.runtime.is_source_upload_enabled()
    }

    /// Sends the encoded source to the service. Returns whether the
    /// service acknowledged the upload; a rejection is a user-visible
    /// warning, not an error.
    pub async fn upload(&self, name: &str, source: &str) -> Result<bool, RuntimeError> {
        match self.runtime.api().upload_source(name, source).await {
            Ok(ack) if ack.is_success() => {
                self.runtime.events().notify(
                    NoticeLevel::Success,
                    "Success",
                    format!(
                        "The source was successfully uploaded:\n{}",
                        ack.message.as_deref().unwrap_or_default()
                    ),
                );
                Ok(true)
            }
            Ok(_) => {
                self.runtime.events().notify(
                    NoticeLevel::Warning,
                    "Warning",
                    "Sorry, the source upload has failed.",
                );
                Ok(false)
            }
            Err(err) => {
                self.runtime.events().notify(
                    NoticeLevel::Error,
                    "Oops",
                    "Sorry, something went wrong when trying to upload some source code.",
                );
                self.runtime.push_error(&err);
                Err(err)
            }
        }
    }
}
