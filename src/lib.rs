//! MCP Sandbox Gateway
//!
//! A model-context gateway that exposes a sandboxed code-execution tool to
//! MCP clients behind an OAuth 2.1 authorization server.
//!
//! # Components
//!
//! - **Authorization server**: authorization-code flow with PKCE, GitHub
//!   identity federation, organization policy, audience-bound tokens
//! - **Auth middleware**: bearer gating with a closed public-path set and
//!   RFC 9728 challenges
//! - **Sandbox runtime**: one hardened container per execution (Docker or
//!   gVisor), resource limits, deterministic teardown on timeout
//! - **Transports**: stdio, SSE, and Streamable HTTP on one listener

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod protocol;
pub mod sandbox;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
