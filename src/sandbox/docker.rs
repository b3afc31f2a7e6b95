//! Docker sandbox backend
//!
//! Standard container isolation. One container per execution with a
//! hardened profile: non-root user, read-only rootfs, no-new-privileges,
//! all capabilities dropped, bounded tmpfs /tmp, PID limit, memory and CPU
//! quotas. The synchronous wait runs in its own task so a request handler
//! can time out and force-kill without stalling the dispatch loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    ExecutionResult, SandboxBackend, TIMEOUT_GRACE_SECONDS, read_metrics_file, scan_output_files,
};
use crate::config::SandboxConfig;
use crate::observability;
use crate::{Error, Result};

/// CPU quota period in microseconds
const CPU_PERIOD_MICROS: i64 = 100_000;

/// Maximum number of processes inside a container
const PIDS_LIMIT: i64 = 100;

/// Size and mode of the in-memory /tmp mount
const TMPFS_OPTIONS: &str = "size=100M,mode=1777";

/// Label marking containers owned by this gateway
const MANAGED_LABEL: &str = "io.mcp-sandbox-gateway.managed";

/// Label carrying the execution identifier
const EXECUTION_ID_LABEL: &str = "io.mcp-sandbox-gateway.execution-id";

/// Execution identifier length (hex chars of a v4 UUID)
const EXECUTION_ID_LENGTH: usize = 8;

/// Docker-based sandbox backend
pub struct DockerBackend {
    image: String,
    default_timeout: u64,
    memory_limit_bytes: i64,
    cpu_limit: f64,
    network: String,
    runtime: Option<String>,
    client: Mutex<Option<Docker>>,
    /// execution id -> container name, shared with in-flight run tasks
    active: Arc<Mutex<HashMap<String, String>>>,
}

/// Everything a run task needs, detached from `&self` so the task can
/// outlive a cancelled request
struct RunSpec {
    execution_id: String,
    container_name: String,
    image: String,
    env: Vec<String>,
    binds: Vec<String>,
    memory_limit_bytes: i64,
    cpu_quota: i64,
    network: String,
    runtime: Option<String>,
}

impl DockerBackend {
    /// Create a Docker backend from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the memory limit is malformed.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Self::with_runtime(config, None)
    }

    /// Create a backend pinned to a specific container runtime
    pub(crate) fn with_runtime(config: &SandboxConfig, runtime: Option<String>) -> Result<Self> {
        Ok(Self {
            image: config.image.clone(),
            default_timeout: config.timeout,
            memory_limit_bytes: config.memory_limit_bytes()?,
            cpu_limit: config.cpu_limit,
            network: config.network.clone(),
            runtime,
            client: Mutex::new(None),
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Get or create the engine client
    pub(crate) fn client(&self) -> Result<Docker> {
        let mut guard = self.client.lock();
        if let Some(ref docker) = *guard {
            return Ok(docker.clone());
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Engine(format!("Failed to connect to Docker: {e}")))?;
        *guard = Some(docker.clone());
        Ok(docker)
    }

    /// Number of currently tracked containers
    pub fn tracked_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Force-kill a tracked container after its deadline expired
    async fn force_kill(&self, execution_id: &str) {
        let Some(container_name) = self.active.lock().remove(execution_id) else {
            return;
        };
        observability::set_running_containers(self.active.lock().len());

        warn!(execution_id = %execution_id, "Force killing timed out container");

        let Ok(docker) = self.client() else {
            return;
        };

        if let Err(e) = docker
            .kill_container(&container_name, None::<KillContainerOptions<String>>)
            .await
        {
            debug!(execution_id = %execution_id, error = %e, "Kill failed (container may have exited)");
        }

        if let Err(e) = docker
            .remove_container(
                &container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            debug!(execution_id = %execution_id, error = %e, "Remove failed (container may be gone)");
        }
    }
}

#[async_trait::async_trait]
impl SandboxBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(
        &self,
        code: &str,
        env: &HashMap<String, String>,
        timeout: Option<u64>,
    ) -> Result<ExecutionResult> {
        let execution_timeout = timeout.unwrap_or(self.default_timeout);
        let execution_id: String = Uuid::new_v4().simple().to_string()[..EXECUTION_ID_LENGTH].to_string();

        // Scratch layout: shared/ (ro, holds the script) and output/ (rw).
        let scratch = tempfile::tempdir()?;
        let shared_dir = scratch.path().join("shared");
        let output_dir = scratch.path().join("output");
        std::fs::create_dir(&shared_dir)?;
        std::fs::create_dir(&output_dir)?;
        std::fs::write(shared_dir.join("script.py"), code)?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let cpu_quota = (CPU_PERIOD_MICROS as f64 * self.cpu_limit) as i64;

        let spec = RunSpec {
            execution_id: execution_id.clone(),
            container_name: format!("mcp-sandbox-{execution_id}"),
            image: self.image.clone(),
            env: env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            binds: vec![
                format!("{}:/shared:ro", shared_dir.display()),
                format!("{}:/output:rw", output_dir.display()),
            ],
            memory_limit_bytes: self.memory_limit_bytes,
            cpu_quota,
            network: self.network.clone(),
            runtime: self.runtime.clone(),
        };

        debug!(
            execution_id = %execution_id,
            image = %self.image,
            timeout = execution_timeout,
            "Starting container"
        );

        let docker = self.client();
        let active = Arc::clone(&self.active);

        // The run owns the scratch directory and keeps going past a client
        // disconnect; only the deadline below kills it early.
        let handle = tokio::spawn(run_and_collect(docker, active, spec, scratch));

        let deadline = Duration::from_secs(execution_timeout + TIMEOUT_GRACE_SECONDS);
        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(Error::Sandbox(format!("Execution task failed: {e}"))),
            Err(_) => {
                self.force_kill(&execution_id).await;
                warn!(execution_id = %execution_id, "Container execution timed out");
                Err(Error::SandboxTimeout {
                    seconds: execution_timeout,
                })
            }
        }
    }

    async fn cleanup(&self) {
        let drained: Vec<(String, String)> = {
            let mut active = self.active.lock();
            active.drain().collect()
        };
        observability::set_running_containers(0);

        if drained.is_empty() {
            return;
        }

        let Ok(docker) = self.client() else {
            return;
        };

        for (execution_id, container_name) in drained {
            match docker
                .remove_container(
                    &container_name,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                Ok(()) => debug!(execution_id = %execution_id, "Cleaned up container"),
                Err(e) => {
                    warn!(execution_id = %execution_id, error = %e, "Failed to cleanup container");
                }
            }
        }
    }
}

/// Run the container and collect outputs. Engine failures are reported in
/// the result with exit code 1 rather than as transport errors.
async fn run_and_collect(
    docker: Result<Docker>,
    active: Arc<Mutex<HashMap<String, String>>>,
    spec: RunSpec,
    scratch: tempfile::TempDir,
) -> ExecutionResult {
    let started = Instant::now();

    let (exit_code, stdout, stderr) = match docker {
        Ok(docker) => run_container(&docker, &active, &spec).await,
        Err(e) => (1, String::new(), format!("Container error: {e}")),
    };

    let output_dir = scratch.path().join("output");
    let output_files = scan_output_files(&output_dir);
    let metrics = read_metrics_file(&output_dir);

    let duration_seconds = started.elapsed().as_secs_f64();
    debug!(
        execution_id = %spec.execution_id,
        exit_code,
        duration = duration_seconds,
        "Container finished"
    );

    ExecutionResult {
        stdout,
        stderr,
        exit_code,
        output_files,
        metrics,
        duration_seconds,
    }
}

/// Create, start, and wait for the container, returning
/// `(exit_code, stdout, stderr)`
async fn run_container(
    docker: &Docker,
    active: &Mutex<HashMap<String, String>>,
    spec: &RunSpec,
) -> (i64, String, String) {
    let host_config = HostConfig {
        binds: Some(spec.binds.clone()),
        memory: Some(spec.memory_limit_bytes),
        cpu_period: Some(CPU_PERIOD_MICROS),
        cpu_quota: Some(spec.cpu_quota),
        network_mode: Some(spec.network.clone()),
        // Hardening: the payload is untrusted.
        readonly_rootfs: Some(true),
        security_opt: Some(vec!["no-new-privileges:true".to_string()]),
        cap_drop: Some(vec!["ALL".to_string()]),
        pids_limit: Some(PIDS_LIMIT),
        tmpfs: Some(
            [("/tmp".to_string(), TMPFS_OPTIONS.to_string())]
                .into_iter()
                .collect(),
        ),
        runtime: spec.runtime.clone(),
        ..Default::default()
    };

    let config = Config {
        image: Some(spec.image.clone()),
        cmd: Some(vec![
            "python".to_string(),
            "/shared/script.py".to_string(),
        ]),
        env: Some(spec.env.clone()),
        user: Some("nobody".to_string()),
        labels: Some(
            [
                (MANAGED_LABEL.to_string(), "true".to_string()),
                (EXECUTION_ID_LABEL.to_string(), spec.execution_id.clone()),
            ]
            .into_iter()
            .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    };

    if let Err(e) = docker
        .create_container(
            Some(CreateContainerOptions {
                name: spec.container_name.clone(),
                platform: None,
            }),
            config,
        )
        .await
    {
        error!(execution_id = %spec.execution_id, error = %e, "Container create failed");
        return (1, String::new(), format!("Container error: {e}"));
    }

    // Track before starting so a timeout during startup is still killable.
    active
        .lock()
        .insert(spec.execution_id.clone(), spec.container_name.clone());
    observability::set_running_containers(active.lock().len());

    if let Err(e) = docker
        .start_container(&spec.container_name, None::<StartContainerOptions<String>>)
        .await
    {
        error!(execution_id = %spec.execution_id, error = %e, "Container start failed");
        untrack_and_remove(docker, active, spec).await;
        return (1, String::new(), format!("Container error: {e}"));
    }

    let mut wait_stream =
        docker.wait_container(&spec.container_name, None::<WaitContainerOptions<String>>);

    let exit_code = match wait_stream.next().await {
        Some(Ok(response)) => response.status_code,
        // Non-zero exits surface as a wait error carrying the status code.
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
        Some(Err(e)) => {
            error!(execution_id = %spec.execution_id, error = %e, "Container wait failed");
            untrack_and_remove(docker, active, spec).await;
            return (1, String::new(), format!("Container error: {e}"));
        }
        None => {
            untrack_and_remove(docker, active, spec).await;
            return (
                1,
                String::new(),
                "Container error: wait stream ended unexpectedly".to_string(),
            );
        }
    };

    let stdout = collect_logs(docker, &spec.container_name, true, false).await;
    let stderr = collect_logs(docker, &spec.container_name, false, true).await;

    untrack_and_remove(docker, active, spec).await;

    (exit_code, stdout, stderr)
}

/// Remove the tracking entry and the container. Safe against the timeout
/// path having already done both: the map pop is atomic and a missing
/// container is not an error.
async fn untrack_and_remove(
    docker: &Docker,
    active: &Mutex<HashMap<String, String>>,
    spec: &RunSpec,
) {
    active.lock().remove(&spec.execution_id);
    observability::set_running_containers(active.lock().len());

    if let Err(e) = docker
        .remove_container(
            &spec.container_name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        debug!(execution_id = %spec.execution_id, error = %e, "Remove failed (container may be gone)");
    }
}

/// Drain one log stream into a lossily-decoded string
async fn collect_logs(docker: &Docker, container_name: &str, stdout: bool, stderr: bool) -> String {
    let mut stream = docker.logs(
        container_name,
        Some(LogsOptions::<String> {
            stdout,
            stderr,
            ..Default::default()
        }),
    );

    let mut collected = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(log) => collected.push_str(&String::from_utf8_lossy(&log.into_bytes())),
            Err(e) => {
                debug!(error = %e, "Log stream error");
                break;
            }
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxBackendKind;
    use pretty_assertions::assert_eq;

    fn config() -> SandboxConfig {
        SandboxConfig {
            backend: SandboxBackendKind::Docker,
            image: "mcp-sandbox:latest".to_string(),
            timeout: 60,
            memory_limit: "512m".to_string(),
            cpu_limit: 1.5,
            network: "mcp-sandbox".to_string(),
        }
    }

    #[test]
    fn backend_construction_parses_limits() {
        let backend = DockerBackend::new(&config()).unwrap();
        assert_eq!(backend.memory_limit_bytes, 512 * 1024 * 1024);
        assert_eq!(backend.name(), "docker");
        assert_eq!(backend.tracked_count(), 0);
    }

    #[test]
    fn backend_construction_rejects_bad_memory_limit() {
        let bad = SandboxConfig {
            memory_limit: "lots".to_string(),
            ..config()
        };
        assert!(DockerBackend::new(&bad).is_err());
    }

    #[test]
    fn tracking_map_bookkeeping() {
        let backend = DockerBackend::new(&config()).unwrap();

        backend
            .active
            .lock()
            .insert("abc12345".to_string(), "mcp-sandbox-abc12345".to_string());
        assert_eq!(backend.tracked_count(), 1);

        // The pop is first-caller-wins; a second pop is a no-op.
        assert!(backend.active.lock().remove("abc12345").is_some());
        assert!(backend.active.lock().remove("abc12345").is_none());
        assert_eq!(backend.tracked_count(), 0);
    }

    #[tokio::test]
    async fn force_kill_clears_tracking_without_engine() {
        let backend = DockerBackend::new(&config()).unwrap();
        backend
            .active
            .lock()
            .insert("deadbeef".to_string(), "mcp-sandbox-deadbeef".to_string());

        // No reachable engine is fine: the entry must still be dropped.
        backend.force_kill("deadbeef").await;
        assert_eq!(backend.tracked_count(), 0);

        // Unknown ids are a no-op.
        backend.force_kill("deadbeef").await;
        assert_eq!(backend.tracked_count(), 0);
    }

    #[tokio::test]
    async fn cleanup_drains_tracking_map() {
        let backend = DockerBackend::new(&config()).unwrap();
        backend
            .active
            .lock()
            .insert("11111111".to_string(), "mcp-sandbox-11111111".to_string());
        backend
            .active
            .lock()
            .insert("22222222".to_string(), "mcp-sandbox-22222222".to_string());

        backend.cleanup().await;
        assert_eq!(backend.tracked_count(), 0);
    }

    #[test]
    fn env_formatting_in_spec() {
        let env: HashMap<String, String> =
            [("SANDBOX_PROMETHEUS_URL".to_string(), "http://prom:9090".to_string())]
                .into_iter()
                .collect();
        let formatted: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(formatted, vec!["SANDBOX_PROMETHEUS_URL=http://prom:9090"]);
    }
}
