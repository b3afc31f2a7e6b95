//! OAuth 2.1 authorization server and resource protection
//!
//! Implements:
//! - Authorization code flow with PKCE (RFC 7636)
//! - Audience-bound tokens via resource indicators (RFC 8707)
//! - Discovery metadata (RFC 8414, RFC 9728)
//! - Bearer-token middleware with a closed public-path set
//! - GitHub identity federation with organization policy

pub mod discovery;
pub mod github;
pub mod middleware;
pub mod models;
pub mod server;
pub mod store;
pub mod tokens;

pub use middleware::{AuthGate, AuthenticatedUser, auth_middleware, require_scope};
pub use server::AuthorizationServer;
pub use store::AuthStore;
pub use tokens::{TokenClaims, TokenManager, TokenType, TokenValidationError};
