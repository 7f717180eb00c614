//! API endpoint configuration.
//!
//! The base URL is resolved once per process from `API_SCHEME`, `API_HOST`
//! and `API_PORT` (defaults target a local development service). Route URLs
//! are built by typed methods rather than looked up in a string-keyed
//! table, so a typo in a route name cannot survive compilation.

use crucible_common::Stage;

const DEFAULT_SCHEME: &str = "http://";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: &str = "3000";

/// Resolved endpoint configuration for the remote verification services.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    base_url: String,
}

impl ApiConfig {
    /// Resolves the base URL from the process environment.
    pub fn from_env() -> Self {
        let scheme = env_or("API_SCHEME", DEFAULT_SCHEME);
        let host = env_or("API_HOST", DEFAULT_HOST);
        let port = env_or("API_PORT", DEFAULT_PORT);
        Self::from_parts(&scheme, &host, &port)
    }

    /// Builds a configuration from explicit parts. An empty port is
    /// omitted entirely, matching production deployments behind a default
    /// https port.
    pub fn from_parts(scheme: &str, host: &str, port: &str) -> Self {
        let base_url = if port.is_empty() {
            format!("{scheme}{host}")
        } else {
            format!("{scheme}{host}:{port}")
        };
        Self { base_url }
    }

    /// Wraps an already-composed base URL (used by tests against an
    /// ephemeral mock service).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn upload_source_url(&self) -> String {
        format!("{}/source", self.base_url)
    }

    pub fn start_source_restoration_url(&self) -> String {
        format!("{}/source-restoration", self.base_url)
    }

    /// POST route starting a stage for an existing project.
    pub fn start_stage_url(&self, stage: Stage, project_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, stage.route_segment(), project_id)
    }

    pub fn stage_progress_url(&self, stage: Stage, project_id: &str) -> String {
        format!(
            "{}/{}/{}/progress",
            self.base_url,
            stage.route_segment(),
            project_id
        )
    }

    pub fn stage_report_url(&self, stage: Stage, project_id: &str) -> String {
        format!(
            "{}/{}/{}/report",
            self.base_url,
            stage.route_segment(),
            project_id
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parts_compose_local_base_url() {
        let config = ApiConfig::from_parts(DEFAULT_SCHEME, DEFAULT_HOST, DEFAULT_PORT);
        assert_eq!(config.base_url(), "http://localhost:3000");
    }

    #[test]
    fn empty_port_is_omitted() {
        let config = ApiConfig::from_parts("https://", "verifier.example.org", "");
        assert_eq!(config.base_url(), "https://verifier.example.org");
    }

    #[test]
    fn stage_routes_interpolate_project_id() {
        let config = ApiConfig::with_base_url("http://localhost:3000");
        assert_eq!(
            config.start_stage_url(Stage::LlvmBitcodeGeneration, "proj1"),
            "http://localhost:3000/llvm-bitcode-generation/proj1"
        );
        assert_eq!(
            config.stage_progress_url(Stage::SymbolicExecution, "proj1"),
            "http://localhost:3000/symbolic-execution/proj1/progress"
        );
        assert_eq!(
            config.stage_report_url(Stage::SourceRestoration, "proj1"),
            "http://localhost:3000/source-restoration/proj1/report"
        );
    }

    #[test]
    fn restoration_start_has_no_project_segment() {
        let config = ApiConfig::with_base_url("http://localhost:3000");
        assert_eq!(
            config.start_source_restoration_url(),
            "http://localhost:3000/source-restoration"
        );
        assert_eq!(config.upload_source_url(), "http://localhost:3000/source");
    }
}
