//! Tool surface exposed over MCP
//!
//! The catalog of query examples, schema browsers, and documentation blobs
//! is an external collaborator; the in-core surface is the sandboxed
//! execute tool.

mod execute;

use axum::response::Response;
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::protocol::{Tool, ToolCallResult};

pub use execute::{ExecutePythonTool, build_sandbox_env};

/// Why a tool call could not produce a tool result
pub enum ToolCallError {
    /// No tool with that name
    UnknownTool(String),
    /// Arguments failed validation
    InvalidParams(String),
    /// Scope denial: a ready-to-send 403 challenge
    ScopeDenied(Box<Response>),
}

/// Registry backing `tools/list` and `tools/call`
pub struct ToolRegistry {
    execute_python: ExecutePythonTool,
    resource_metadata_url: String,
}

impl ToolRegistry {
    /// Create the registry
    #[must_use]
    pub fn new(execute_python: ExecutePythonTool, resource_metadata_url: String) -> Self {
        Self {
            execute_python,
            resource_metadata_url,
        }
    }

    /// Tool definitions for `tools/list`
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        vec![self.execute_python.definition()]
    }

    /// Dispatch a `tools/call`
    ///
    /// # Errors
    ///
    /// Returns [`ToolCallError`] for unknown tools, invalid arguments, or a
    /// scope denial.
    pub async fn call(
        &self,
        name: &str,
        arguments: &Value,
        auth_user: Option<&AuthenticatedUser>,
    ) -> Result<ToolCallResult, ToolCallError> {
        match name {
            execute::TOOL_NAME => {
                self.execute_python
                    .call(arguments, auth_user, &self.resource_metadata_url)
                    .await
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}
