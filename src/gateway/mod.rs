//! Gateway wiring: MCP dispatch, HTTP routing, streaming, lifecycle

pub mod mcp;
pub mod router;
pub mod server;
pub mod streaming;

pub use mcp::{McpHandler, McpOutcome};
pub use router::{AppState, create_router};
pub use server::Gateway;
pub use streaming::StreamingSessions;
