//! HTTP client for the remote verification services.
//!
//! Every response type keeps its expected fields as `Option`s and carries
//! unrecognized fields along untouched: a response missing its expected
//! field, or carrying an `error` field, is *failure-shaped* — an outcome
//! the callers decide how to treat (a warning for a start action, a silent
//! skip for a progress tick). Only transport and JSON-parse failures
//! surface as `RuntimeError::Transport`.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crucible_common::{Stage, progress};

use crate::config::ApiConfig;
use crate::errors::RuntimeError;

/// Acknowledgement of a start/upload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StartAck {
    pub fn is_success(&self) -> bool {
        self.message.is_some() && self.error.is_none()
    }
}

/// Acknowledgement of a source-restoration request, carrying the
/// server-assigned project id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorationAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RestorationAck {
    pub fn is_success(&self) -> bool {
        matches!(self.project_id.as_deref(), Some(id) if !id.is_empty()) && self.error.is_none()
    }
}

/// Progress of a running stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StageProgress {
    pub fn is_failure_shaped(&self) -> bool {
        self.message.is_none() || self.error.is_some()
    }

    /// True once the remote job has terminated, successfully or not.
    pub fn is_exited(&self) -> bool {
        self.raw_status.as_deref() == Some(progress::EXITED)
    }

    /// The payload as stored on the project, opaque fields included.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Textual report of a stage. Most stages carry `messages`; source
/// restoration carries `raw_log` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StageReport {
    pub fn is_failure_shaped(&self) -> bool {
        (self.messages.is_none() && self.raw_log.is_none()) || self.error.is_some()
    }

    /// The report text, whichever field the stage uses.
    pub fn text(&self) -> &str {
        self.messages
            .as_deref()
            .or(self.raw_log.as_deref())
            .unwrap_or("")
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Thin reqwest wrapper with the fixed request init shared by every call:
/// JSON content type, no caching, redirects followed, no referrer.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, RuntimeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .referer(false)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// POST /source — ships the encoded source to the service.
    pub async fn upload_source(&self, name: &str, source: &str) -> Result<StartAck, RuntimeError> {
        let ack = self
            .http
            .post(self.config.upload_source_url())
            .json(&serde_json::json!({ "name": name, "source": source }))
            .send()
            .await?
            .json()
            .await?;
        Ok(ack)
    }

    /// POST /source-restoration — asks the service to restore a source
    /// archive into a fresh project.
    pub async fn start_source_restoration(
        &self,
        source: &str,
    ) -> Result<RestorationAck, RuntimeError> {
        let ack = self
            .http
            .post(self.config.start_source_restoration_url())
            .json(&serde_json::json!({ "source": source }))
            .send()
            .await?
            .json()
            .await?;
        Ok(ack)
    }

    /// POST /{stage}/{id} — begins a stage for an existing project.
    /// Symbolic execution is the only stage with a request body.
    pub async fn start_stage(
        &self,
        stage: Stage,
        project_id: &str,
        flags: Option<&str>,
    ) -> Result<StartAck, RuntimeError> {
        let mut request = self.http.post(self.config.start_stage_url(stage, project_id));
        if let Some(flags) = flags {
            request = request.json(&serde_json::json!({ "flags": flags }));
        }
        let ack = request.send().await?.json().await?;
        Ok(ack)
    }

    /// GET /{stage}/{id}/progress
    pub async fn stage_progress(
        &self,
        stage: Stage,
        project_id: &str,
    ) -> Result<StageProgress, RuntimeError> {
        let progress = self
            .http
            .get(self.config.stage_progress_url(stage, project_id))
            .send()
            .await?
            .json()
            .await?;
        Ok(progress)
    }

    /// GET /{stage}/{id}/report
    pub async fn stage_report(
        &self,
        stage: Stage,
        project_id: &str,
    ) -> Result<StageReport, RuntimeError> {
        let report = self
            .http
            .get(self.config.stage_report_url(stage, project_id))
            .send()
            .await?
            .json()
            .await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_ack_shapes() {
        let ok: StartAck = serde_json::from_value(json!({"message": "triggered"})).unwrap();
        assert!(ok.is_success());

        let missing: StartAck = serde_json::from_value(json!({})).unwrap();
        assert!(!missing.is_success());

        let failed: StartAck =
            serde_json::from_value(json!({"message": "m", "error": "boom"})).unwrap();
        assert!(!failed.is_success());
    }

    #[test]
    fn restoration_ack_requires_non_empty_project_id() {
        let ok: RestorationAck =
            serde_json::from_value(json!({"project_id": "p1", "message": "restored"})).unwrap();
        assert!(ok.is_success());

        let empty: RestorationAck =
            serde_json::from_value(json!({"project_id": "", "message": "restored"})).unwrap();
        assert!(!empty.is_success());

        let missing: RestorationAck = serde_json::from_value(json!({"message": "m"})).unwrap();
        assert!(!missing.is_success());
    }

    #[test]
    fn progress_completion_sentinel_is_exited() {
        let running: StageProgress =
            serde_json::from_value(json!({"message": "m", "raw_status": "running"})).unwrap();
        assert!(!running.is_exited());
        assert!(!running.is_failure_shaped());

        let exited: StageProgress =
            serde_json::from_value(json!({"message": "m", "raw_status": "exited"})).unwrap();
        assert!(exited.is_exited());
    }

    #[test]
    fn progress_round_trips_opaque_fields() {
        let progress: StageProgress = serde_json::from_value(
            json!({"message": "m", "raw_status": "running", "container": "c0ffee"}),
        )
        .unwrap();
        let value = progress.to_value();
        assert_eq!(value.get("container"), Some(&json!("c0ffee")));
        // Absent options stay absent rather than serializing as null.
        assert!(value.get("error").is_none());
    }

    #[test]
    fn report_text_prefers_messages_over_raw_log() {
        let report: StageReport =
            serde_json::from_value(json!({"messages": "built", "raw_log": "log"})).unwrap();
        assert_eq!(report.text(), "built");

        let restoration: StageReport =
            serde_json::from_value(json!({"raw_log": "restored"})).unwrap();
        assert_eq!(restoration.text(), "restored");
        assert!(!restoration.is_failure_shaped());

        let empty: StageReport = serde_json::from_value(json!({})).unwrap();
        assert!(empty.is_failure_shaped());
    }
}
