//! gVisor sandbox backend
//!
//! Runs the same execution recipe as the Docker backend but pins the
//! container runtime to runsc, a user-space kernel that intercepts system
//! calls. Runtime availability is verified on first use; a missing runtime
//! refuses to run rather than silently degrading to weaker isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use super::{DockerBackend, ExecutionResult, SandboxBackend};
use crate::config::SandboxConfig;
use crate::{Error, Result};

/// The hardened container runtime
const RUNTIME: &str = "runsc";

/// gVisor-based sandbox backend (Linux hosts only)
pub struct GVisorBackend {
    inner: DockerBackend,
    runtime_checked: AtomicBool,
}

impl GVisorBackend {
    /// Create a gVisor backend from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the memory limit is malformed.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Ok(Self {
            inner: DockerBackend::with_runtime(config, Some(RUNTIME.to_string()))?,
            runtime_checked: AtomicBool::new(false),
        })
    }

    /// Verify the runsc runtime is registered with the engine.
    /// Checked once; subsequent executions skip the probe.
    async fn check_runtime(&self) -> Result<()> {
        if self.runtime_checked.load(Ordering::Acquire) {
            return Ok(());
        }

        let docker = self.inner.client()?;
        let engine_info = docker
            .info()
            .await
            .map_err(|e| Error::Engine(format!("Failed to check Docker runtimes: {e}")))?;

        let runtimes = engine_info.runtimes.unwrap_or_default();
        if !runtimes.contains_key(RUNTIME) {
            let mut available: Vec<&String> = runtimes.keys().collect();
            available.sort();
            return Err(Error::Engine(format!(
                "gVisor runtime '{RUNTIME}' not found. Available runtimes: {available:?}. \
                 Install gVisor: https://gvisor.dev/docs/user_guide/install/"
            )));
        }

        self.runtime_checked.store(true, Ordering::Release);
        info!(runtime = RUNTIME, "gVisor runtime verified");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SandboxBackend for GVisorBackend {
    fn name(&self) -> &'static str {
        "gvisor"
    }

    async fn execute(
        &self,
        code: &str,
        env: &HashMap<String, String>,
        timeout: Option<u64>,
    ) -> Result<ExecutionResult> {
        self.check_runtime().await?;
        self.inner.execute(code, env, timeout).await
    }

    async fn cleanup(&self) {
        self.inner.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxBackendKind;

    #[test]
    fn backend_construction() {
        let backend = GVisorBackend::new(&SandboxConfig {
            backend: SandboxBackendKind::Gvisor,
            ..SandboxConfig::default()
        })
        .unwrap();
        assert_eq!(backend.name(), "gvisor");
        assert!(!backend.runtime_checked.load(Ordering::Acquire));
    }
}
