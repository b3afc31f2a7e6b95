//! Sandboxed code-execution tool

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{info, warn};

use super::ToolCallError;
use crate::Error;
use crate::auth::{AuthenticatedUser, require_scope};
use crate::config::Config;
use crate::observability;
use crate::protocol::{Content, Tool, ToolCallResult};
use crate::sandbox::SandboxBackend;

/// Tool name, which is also its required scope
pub const TOOL_NAME: &str = "execute_python";

/// Default per-call timeout in seconds when none is configured
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Hard upper bound on the per-call timeout
const MAX_TIMEOUT_SECONDS: u64 = 300;

const TOOL_DESCRIPTION: &str = "\
Execute Python code in a sandboxed environment.

The sandbox helper library is pre-installed for querying the configured
datasources:

```python
from sandbox import clickhouse, prometheus, loki, storage

# Query a configured ClickHouse cluster by name
df = clickhouse.query(\"main\", \"SELECT count() FROM events\")

# Query Prometheus metrics
result = prometheus.query(\"up\")

# Generate and save charts
import matplotlib.pyplot as plt
plt.plot(df['ts'], df['value'])
plt.savefig('/output/chart.png')

# Upload to get a URL
url = storage.upload('/output/chart.png')
print(f\"Chart: {url}\")
```

All output files should be written to the /output/ directory.
Data stays in the sandbox - the model only sees stdout and file URLs.";

/// The `execute_python` tool: marshals the caller's payload plus configured
/// datasource credentials into the sandbox and wraps the result
pub struct ExecutePythonTool {
    sandbox: Arc<dyn SandboxBackend>,
    /// Credential env assembled once from config; caller payloads never
    /// contribute environment variables
    sandbox_env: HashMap<String, String>,
    default_timeout: u64,
}

impl ExecutePythonTool {
    /// Create the tool
    #[must_use]
    pub fn new(sandbox: Arc<dyn SandboxBackend>, config: &Config) -> Self {
        Self {
            sandbox,
            sandbox_env: build_sandbox_env(config),
            default_timeout: config.sandbox.timeout.clamp(1, MAX_TIMEOUT_SECONDS),
        }
    }

    /// Tool definition for `tools/list`
    #[must_use]
    pub fn definition(&self) -> Tool {
        Tool {
            name: TOOL_NAME.to_string(),
            description: Some(TOOL_DESCRIPTION.to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Python code to execute",
                    },
                    "timeout": {
                        "type": "integer",
                        "description": format!(
                            "Execution timeout in seconds (default: {}, max: {MAX_TIMEOUT_SECONDS})",
                            self.default_timeout
                        ),
                        "minimum": 1,
                        "maximum": MAX_TIMEOUT_SECONDS,
                        "default": self.default_timeout,
                    },
                },
                "required": ["code"],
            }),
        }
    }

    /// Run the tool
    ///
    /// # Errors
    ///
    /// Returns [`ToolCallError`] on missing code or a scope denial. Sandbox
    /// failures (including timeouts) are reported inside the tool result,
    /// never as transport failures.
    pub async fn call(
        &self,
        arguments: &Value,
        auth_user: Option<&AuthenticatedUser>,
        resource_metadata_url: &str,
    ) -> Result<ToolCallResult, ToolCallError> {
        if let Err(response) = require_scope(auth_user, TOOL_NAME, resource_metadata_url) {
            return Err(ToolCallError::ScopeDenied(Box::new(response)));
        }

        let Some(code) = arguments.get("code").and_then(Value::as_str) else {
            return Err(ToolCallError::InvalidParams("Code is required".to_string()));
        };
        if code.is_empty() {
            return Err(ToolCallError::InvalidParams("Code is required".to_string()));
        }

        let timeout = clamp_timeout(arguments.get("timeout"), self.default_timeout);

        info!(
            code_length = code.len(),
            timeout,
            backend = self.sandbox.name(),
            "Executing code"
        );

        let started = Instant::now();
        let result = self
            .sandbox
            .execute(code, &self.sandbox_env, Some(timeout))
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        let result = match result {
            Ok(result) => result,
            Err(Error::SandboxTimeout { seconds }) => {
                warn!(timeout = seconds, "Execution timed out");
                observability::record_tool_call(TOOL_NAME, "timeout", elapsed);
                return Ok(ToolCallResult {
                    content: vec![Content::text(format!(
                        "Execution timed out after {seconds} seconds"
                    ))],
                    is_error: true,
                });
            }
            Err(e) => {
                warn!(error = %e, "Execution failed");
                observability::record_tool_call(TOOL_NAME, "error", elapsed);
                return Ok(ToolCallResult {
                    content: vec![Content::text(format!("Execution error: {e}"))],
                    is_error: true,
                });
            }
        };

        observability::record_sandbox_execution(self.sandbox.name(), result.duration_seconds);
        if let Some(ref metrics) = result.metrics {
            observability::record_sandbox_metrics(metrics);
        }

        let status = if result.exit_code == 0 { "success" } else { "error" };
        observability::record_tool_call(TOOL_NAME, status, elapsed);

        info!(
            exit_code = result.exit_code,
            duration = result.duration_seconds,
            output_files = ?result.output_files,
            "Execution completed"
        );

        let mut sections = Vec::new();
        if !result.stdout.is_empty() {
            sections.push(format!("=== STDOUT ===\n{}", result.stdout));
        }
        if !result.stderr.is_empty() {
            sections.push(format!("=== STDERR ===\n{}", result.stderr));
        }
        if !result.output_files.is_empty() {
            let files: Vec<String> = result
                .output_files
                .iter()
                .map(|f| format!("  - {f}"))
                .collect();
            sections.push(format!("=== OUTPUT FILES ===\n{}", files.join("\n")));
        }
        sections.push(format!("=== EXIT CODE: {} ===", result.exit_code));
        sections.push(format!("=== DURATION: {:.2}s ===", result.duration_seconds));

        Ok(ToolCallResult {
            content: vec![Content::text(sections.join("\n\n"))],
            is_error: result.exit_code != 0,
        })
    }
}

/// Clamp a caller-supplied timeout to `1..=MAX_TIMEOUT_SECONDS`
fn clamp_timeout(value: Option<&Value>, default: u64) -> u64 {
    value
        .and_then(Value::as_u64)
        .unwrap_or(default)
        .clamp(1, MAX_TIMEOUT_SECONDS)
}

/// Assemble the env-var set handed to every sandbox run. Only credential
/// and locator variables from the gateway's own configuration; the caller's
/// payload never supplies env.
#[must_use]
pub fn build_sandbox_env(config: &Config) -> HashMap<String, String> {
    let mut env = HashMap::new();

    for (name, cluster) in &config.datasources.clickhouse {
        let prefix = format!(
            "SANDBOX_CLICKHOUSE_{}",
            name.to_uppercase().replace('-', "_")
        );
        env.insert(format!("{prefix}_HOST"), cluster.host.clone());
        env.insert(format!("{prefix}_PORT"), cluster.port.to_string());
        env.insert(format!("{prefix}_PROTOCOL"), cluster.protocol.clone());
        env.insert(format!("{prefix}_USER"), cluster.user.clone());
        env.insert(format!("{prefix}_PASSWORD"), cluster.resolve_password());
        env.insert(format!("{prefix}_DATABASE"), cluster.database.clone());
    }

    if let Some(ref prometheus) = config.datasources.prometheus {
        env.insert("SANDBOX_PROMETHEUS_URL".to_string(), prometheus.url.clone());
    }

    if let Some(ref loki) = config.datasources.loki {
        env.insert("SANDBOX_LOKI_URL".to_string(), loki.url.clone());
    }

    if let Some(ref storage) = config.datasources.storage {
        env.insert("SANDBOX_S3_ENDPOINT".to_string(), storage.endpoint.clone());
        env.insert("SANDBOX_S3_ACCESS_KEY".to_string(), storage.resolve_access_key());
        env.insert("SANDBOX_S3_SECRET_KEY".to_string(), storage.resolve_secret_key());
        env.insert("SANDBOX_S3_BUCKET".to_string(), storage.bucket.clone());
        env.insert("SANDBOX_S3_REGION".to_string(), storage.region.clone());
        if let Some(ref prefix) = storage.public_url_prefix {
            env.insert("SANDBOX_S3_PUBLIC_URL_PREFIX".to_string(), prefix.clone());
        }
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClickHouseConfig, LokiConfig, PrometheusConfig, StorageConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn timeout_clamping() {
        assert_eq!(clamp_timeout(None, 60), 60);
        assert_eq!(clamp_timeout(Some(&json!(30)), 60), 30);
        assert_eq!(clamp_timeout(Some(&json!(0)), 60), 1);
        assert_eq!(clamp_timeout(Some(&json!(100_000)), 60), 300);
        assert_eq!(clamp_timeout(Some(&json!("soon")), 60), 60);
    }

    #[test]
    fn sandbox_env_from_full_config() {
        let mut config = Config::default();
        config.datasources.clickhouse.insert(
            "main".to_string(),
            ClickHouseConfig {
                host: "ch.internal".to_string(),
                port: 8443,
                protocol: "https".to_string(),
                user: "reader".to_string(),
                password: "hunter2".to_string(),
                database: "events".to_string(),
            },
        );
        config.datasources.prometheus = Some(PrometheusConfig {
            url: "http://prom:9090".to_string(),
        });
        config.datasources.loki = Some(LokiConfig {
            url: "http://loki:3100".to_string(),
        });
        config.datasources.storage = Some(StorageConfig {
            endpoint: "https://s3.internal".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            bucket: "artifacts".to_string(),
            region: "us-east-1".to_string(),
            public_url_prefix: Some("https://cdn.example".to_string()),
        });

        let env = build_sandbox_env(&config);

        assert_eq!(env["SANDBOX_CLICKHOUSE_MAIN_HOST"], "ch.internal");
        assert_eq!(env["SANDBOX_CLICKHOUSE_MAIN_PORT"], "8443");
        assert_eq!(env["SANDBOX_CLICKHOUSE_MAIN_PASSWORD"], "hunter2");
        assert_eq!(env["SANDBOX_CLICKHOUSE_MAIN_DATABASE"], "events");
        assert_eq!(env["SANDBOX_PROMETHEUS_URL"], "http://prom:9090");
        assert_eq!(env["SANDBOX_LOKI_URL"], "http://loki:3100");
        assert_eq!(env["SANDBOX_S3_ENDPOINT"], "https://s3.internal");
        assert_eq!(env["SANDBOX_S3_BUCKET"], "artifacts");
        assert_eq!(env["SANDBOX_S3_PUBLIC_URL_PREFIX"], "https://cdn.example");
    }

    #[test]
    fn sandbox_env_cluster_names_are_normalized() {
        let mut config = Config::default();
        config
            .datasources
            .clickhouse
            .insert("main-experimental".to_string(), ClickHouseConfig::default());

        let env = build_sandbox_env(&config);
        assert!(env.contains_key("SANDBOX_CLICKHOUSE_MAIN_EXPERIMENTAL_HOST"));
    }

    #[test]
    fn sandbox_env_empty_config_is_empty() {
        assert!(build_sandbox_env(&Config::default()).is_empty());
    }
}
