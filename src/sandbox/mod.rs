//! Sandboxed code execution
//!
//! One container per execution: the caller's code is mounted read-only as
//! `/shared/script.py`, artifacts are written to a read-write `/output/`
//! mount, and the container runs under hard resource limits with its
//! capabilities dropped. Backends are selected at construction from the
//! tagged `sandbox.backend` config value.

mod docker;
mod gvisor;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::Result;
use crate::config::{SandboxBackendKind, SandboxConfig};

pub use docker::DockerBackend;
pub use gvisor::GVisorBackend;

/// Extra seconds granted beyond the execution timeout to cover container
/// startup and teardown overhead before the force-kill fires
pub const TIMEOUT_GRACE_SECONDS: u64 = 5;

/// Reserved metrics file name inside `output/`
pub const METRICS_FILE: &str = ".metrics.json";

/// Result of one sandbox execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Container exit code
    pub exit_code: i64,
    /// Names of regular files left in `output/` (dotfiles hidden)
    pub output_files: Vec<String>,
    /// Parsed `output/.metrics.json`, if present and valid
    pub metrics: Option<Value>,
    /// Wall-clock execution duration in seconds
    pub duration_seconds: f64,
}

/// A sandbox execution backend
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Backend name, used as a metrics label
    fn name(&self) -> &'static str;

    /// Execute one code payload under isolation
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SandboxTimeout`] when the deadline expires
    /// (the container is force-killed first). Engine and in-container
    /// failures are reported inside the [`ExecutionResult`].
    async fn execute(
        &self,
        code: &str,
        env: &HashMap<String, String>,
        timeout: Option<u64>,
    ) -> Result<ExecutionResult>;

    /// Force-remove any still-tracked containers
    async fn cleanup(&self);
}

/// Create the configured backend. Unknown backend names never reach here;
/// they fail at config parse time.
pub fn create_backend(config: &SandboxConfig) -> Result<Arc<dyn SandboxBackend>> {
    Ok(match config.backend {
        SandboxBackendKind::Docker => Arc::new(DockerBackend::new(config)?),
        SandboxBackendKind::Gvisor => Arc::new(GVisorBackend::new(config)?),
    })
}

/// Enumerate exported artifact names in an output directory: regular files
/// only, dot-prefixed names are reserved and hidden.
pub(crate) fn scan_output_files(output_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return Vec::new();
    };

    let mut files: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    files.sort();
    files
}

/// Read and leniently parse `output/.metrics.json`. Bad JSON is logged and
/// treated as absent.
pub(crate) fn read_metrics_file(output_dir: &Path) -> Option<Value> {
    let path = output_dir.join(METRICS_FILE);
    let content = std::fs::read_to_string(&path).ok()?;

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Failed to parse metrics file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_scan_hides_dotfiles_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"png").unwrap();
        std::fs::write(dir.path().join("results.csv"), b"csv").unwrap();
        std::fs::write(dir.path().join(".metrics.json"), b"{}").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let files = scan_output_files(dir.path());
        assert_eq!(files, vec!["a.png".to_string(), "results.csv".to_string()]);
    }

    #[test]
    fn output_scan_of_missing_dir_is_empty() {
        assert!(scan_output_files(Path::new("/nonexistent/output")).is_empty());
    }

    #[test]
    fn metrics_file_parses_leniently() {
        let dir = tempfile::tempdir().unwrap();

        // Absent file.
        assert!(read_metrics_file(dir.path()).is_none());

        // Bad JSON is non-fatal.
        std::fs::write(dir.path().join(METRICS_FILE), b"{not json").unwrap();
        assert!(read_metrics_file(dir.path()).is_none());

        // Valid JSON round-trips.
        std::fs::write(dir.path().join(METRICS_FILE), br#"{"queries":[]}"#).unwrap();
        let metrics = read_metrics_file(dir.path()).unwrap();
        assert_eq!(metrics["queries"], serde_json::json!([]));
    }
}
