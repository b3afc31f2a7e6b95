//! MCP request dispatch

use std::sync::Arc;

use axum::response::Response;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::AuthenticatedUser;
use crate::error::rpc_codes;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, RequestId};
use crate::tools::{ToolCallError, ToolRegistry};

/// Outcome of handling one MCP message
pub enum McpOutcome {
    /// A JSON-RPC response to send back
    Response(JsonRpcResponse),
    /// Nothing to send (notification)
    None,
    /// A raw HTTP response that preempts the JSON-RPC envelope
    /// (scope denials keep their 403 + challenge shape)
    Http(Box<Response>),
}

/// Dispatches MCP JSON-RPC requests to the tool registry
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
}

impl McpHandler {
    /// Create the handler
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Handle one JSON-RPC message
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        auth_user: Option<&AuthenticatedUser>,
    ) -> McpOutcome {
        debug!(method = %request.method, "MCP request");

        if request.is_notification() {
            // notifications/initialized and friends need no reply.
            return McpOutcome::None;
        }
        // Checked above.
        let Some(id) = request.id.clone() else {
            return McpOutcome::None;
        };

        match request.method.as_str() {
            "initialize" => McpOutcome::Response(self.initialize(id)),
            "ping" => McpOutcome::Response(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => McpOutcome::Response(JsonRpcResponse::success(
                id,
                json!({ "tools": self.tools.list() }),
            )),
            "tools/call" => self.tools_call(id, request.params, auth_user).await,
            other => McpOutcome::Response(JsonRpcResponse::error(
                Some(id),
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn initialize(&self, id: RequestId) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
    }

    async fn tools_call(
        &self,
        id: RequestId,
        params: Option<Value>,
        auth_user: Option<&AuthenticatedUser>,
    ) -> McpOutcome {
        let params = params.unwrap_or_default();
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return McpOutcome::Response(JsonRpcResponse::error(
                Some(id),
                rpc_codes::INVALID_PARAMS,
                "Missing tool name",
            ));
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match self.tools.call(name, &arguments, auth_user).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => McpOutcome::Response(JsonRpcResponse::success(id, value)),
                Err(e) => McpOutcome::Response(JsonRpcResponse::error(
                    Some(id),
                    rpc_codes::INTERNAL_ERROR,
                    format!("Failed to encode tool result: {e}"),
                )),
            },
            Err(ToolCallError::UnknownTool(name)) => McpOutcome::Response(JsonRpcResponse::error(
                Some(id),
                rpc_codes::INVALID_PARAMS,
                format!("Unknown tool: {name}"),
            )),
            Err(ToolCallError::InvalidParams(message)) => McpOutcome::Response(
                JsonRpcResponse::error(Some(id), rpc_codes::INVALID_PARAMS, message),
            ),
            Err(ToolCallError::ScopeDenied(response)) => McpOutcome::Http(response),
        }
    }
}
