//! Stdio transport
//!
//! Serves line-delimited JSON-RPC over stdin/stdout for embedded use.
//! No authentication on this transport; the pipe itself is the boundary.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error};

use crate::error::rpc_codes;
use crate::gateway::mcp::{McpHandler, McpOutcome};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::Result;

/// Run the stdio loop until stdin reaches EOF
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run(mcp: &McpHandler) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => match mcp.handle(request, None).await {
                McpOutcome::Response(response) => Some(response),
                // Scope denials cannot occur without an authenticated
                // subject; notifications need no reply.
                McpOutcome::None | McpOutcome::Http(_) => None,
            },
            Err(e) => {
                error!(error = %e, "Failed to parse request line");
                Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        };

        if let Some(response) = response {
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }

    debug!("Stdin EOF, stdio transport done");
    Ok(())
}
