//! MCP Sandbox Gateway - sandboxed code execution behind OAuth 2.1

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mcp_sandbox_gateway::{
    cli::{Cli, Transport},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        sandbox_backend = %config.sandbox.backend,
        auth_enabled = config.auth.enabled,
        "Starting gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.transport {
        Transport::Stdio => gateway.run_stdio().await,
        Transport::Sse | Transport::StreamableHttp => gateway.run().await,
    };

    if let Err(e) = result {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
