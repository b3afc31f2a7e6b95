//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Transport to serve MCP over
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Line-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// SSE stream at /sse with POST /messages/
    Sse,
    /// Streamable HTTP at /mcp
    StreamableHttp,
}

/// MCP gateway with an OAuth 2.1 authorization server and sandboxed code execution
#[derive(Parser, Debug)]
#[command(name = "mcp-sandbox-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MCP_SANDBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Transport protocol
    #[arg(short, long, value_enum, default_value = "stdio", env = "MCP_SANDBOX_TRANSPORT")]
    pub transport: Transport,

    /// Port to listen on (HTTP transports)
    #[arg(short, long, env = "MCP_SANDBOX_PORT")]
    pub port: Option<u16>,

    /// Host to bind to (HTTP transports)
    #[arg(long, env = "MCP_SANDBOX_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_SANDBOX_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MCP_SANDBOX_LOG_FORMAT")]
    pub log_format: Option<String>,
}
