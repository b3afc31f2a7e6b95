//! Error types for the sandbox gateway

use std::io;

use thiserror::Error;

use crate::auth::tokens::TokenValidationError;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token validation failure
    #[error(transparent)]
    TokenValidation(#[from] TokenValidationError),

    /// Sandbox execution exceeded its deadline
    #[error("Execution timed out after {seconds}s")]
    SandboxTimeout {
        /// Configured timeout that was exceeded
        seconds: u64,
    },

    /// Sandbox execution failed before producing a result
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Container engine API failure (daemon unreachable, image missing)
    #[error("Container engine error: {0}")]
    Engine(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// OAuth 2.1 error codes used in `{error, error_description}` bodies
pub mod oauth_codes {
    /// Malformed or incomplete request
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// Bad, expired, or reused grant (code or refresh token)
    pub const INVALID_GRANT: &str = "invalid_grant";
    /// Missing, malformed, or rejected bearer token
    pub const INVALID_TOKEN: &str = "invalid_token";
    /// Resource indicator mismatch (RFC 8707)
    pub const INVALID_TARGET: &str = "invalid_target";
    /// Grant type not offered by this server
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    /// Response type other than `code`
    pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
    /// Token lacks a scope the handler requires
    pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";
    /// Internal failure while processing an OAuth request
    pub const SERVER_ERROR: &str = "server_error";
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}
