//! Execute-tool tests against a scripted sandbox backend
//!
//! Exercises the tool envelope without a container engine: response
//! formatting, dotfile hiding, timeout reporting, and metrics forwarding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use mcp_sandbox_gateway::config::Config;
use mcp_sandbox_gateway::protocol::Content;
use mcp_sandbox_gateway::sandbox::{ExecutionResult, SandboxBackend};
use mcp_sandbox_gateway::tools::{ExecutePythonTool, ToolCallError, ToolRegistry};
use mcp_sandbox_gateway::{Error, Result};

/// Backend that returns a canned outcome
struct ScriptedBackend {
    outcome: fn() -> Result<ExecutionResult>,
}

#[async_trait]
impl SandboxBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        _code: &str,
        _env: &HashMap<String, String>,
        _timeout: Option<u64>,
    ) -> Result<ExecutionResult> {
        (self.outcome)()
    }

    async fn cleanup(&self) {}
}

fn registry_with(outcome: fn() -> Result<ExecutionResult>) -> ToolRegistry {
    let config = Config::default();
    let backend = Arc::new(ScriptedBackend { outcome });
    ToolRegistry::new(
        ExecutePythonTool::new(backend, &config),
        "http://localhost:8000/.well-known/oauth-protected-resource".to_string(),
    )
}

fn text_of(content: &[Content]) -> &str {
    let Content::Text { text } = &content[0];
    text
}

#[tokio::test]
async fn successful_run_formats_all_sections() {
    let registry = registry_with(|| {
        Ok(ExecutionResult {
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            output_files: vec!["a.png".to_string()],
            metrics: Some(json!({"queries": []})),
            duration_seconds: 1.25,
        })
    });

    let result = registry
        .call("execute_python", &json!({"code": "print('hello')"}), None)
        .await
        .ok()
        .unwrap();

    assert!(!result.is_error);
    let text = text_of(&result.content);
    assert!(text.contains("=== STDOUT ===\nhello\n"));
    assert!(!text.contains("=== STDERR ==="));
    assert!(text.contains("=== OUTPUT FILES ===\n  - a.png"));
    assert!(text.contains("=== EXIT CODE: 0 ==="));
    assert!(text.contains("=== DURATION: 1.25s ==="));
}

#[tokio::test]
async fn nonzero_exit_is_an_error_result_with_stderr() {
    let registry = registry_with(|| {
        Ok(ExecutionResult {
            stdout: String::new(),
            stderr: "Traceback (most recent call last):\n".to_string(),
            exit_code: 1,
            output_files: vec![],
            metrics: None,
            duration_seconds: 0.5,
        })
    });

    let result = registry
        .call("execute_python", &json!({"code": "boom"}), None)
        .await
        .ok()
        .unwrap();

    assert!(result.is_error);
    let text = text_of(&result.content);
    assert!(text.contains("=== STDERR ===\nTraceback"));
    assert!(text.contains("=== EXIT CODE: 1 ==="));
}

#[tokio::test]
async fn timeout_is_reported_inside_the_envelope() {
    let registry = registry_with(|| Err(Error::SandboxTimeout { seconds: 2 }));

    let result = registry
        .call(
            "execute_python",
            &json!({"code": "import time; time.sleep(10)", "timeout": 2}),
            None,
        )
        .await
        .ok()
        .unwrap();

    assert!(result.is_error);
    assert_eq!(
        text_of(&result.content),
        "Execution timed out after 2 seconds"
    );
}

#[tokio::test]
async fn engine_failure_is_reported_inside_the_envelope() {
    let registry = registry_with(|| Err(Error::Engine("daemon unreachable".to_string())));

    let result = registry
        .call("execute_python", &json!({"code": "print(1)"}), None)
        .await
        .ok()
        .unwrap();

    assert!(result.is_error);
    assert!(text_of(&result.content).contains("daemon unreachable"));
}

#[tokio::test]
async fn missing_code_is_invalid_params() {
    let registry = registry_with(|| Ok(ExecutionResult::default()));

    let err = registry
        .call("execute_python", &json!({}), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ToolCallError::InvalidParams(_)));

    let err = registry
        .call("execute_python", &json!({"code": ""}), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ToolCallError::InvalidParams(_)));
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let registry = registry_with(|| Ok(ExecutionResult::default()));
    let err = registry
        .call("list_buckets", &json!({}), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ToolCallError::UnknownTool(name) if name == "list_buckets"));
}
