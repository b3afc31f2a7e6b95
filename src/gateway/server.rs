//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info};

use super::mcp::McpHandler;
use super::router::{AppState, create_router};
use super::streaming::StreamingSessions;
use crate::auth::{AuthGate, AuthStore, AuthorizationServer};
use crate::config::Config;
use crate::observability;
use crate::sandbox::{SandboxBackend, create_backend};
use crate::tools::{ExecutePythonTool, ToolRegistry};
use crate::transport;
use crate::{Error, Result};

/// How often expired codes and sessions are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout for IdP HTTP calls
const IDP_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The assembled gateway: auth, sandbox, tools, and transports
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
    auth_gate: Option<Arc<AuthGate>>,
    auth_store: Option<Arc<AuthStore>>,
    sandbox: Arc<dyn SandboxBackend>,
}

impl Gateway {
    /// Wire up all components from configuration
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration: missing signing key,
    /// missing GitHub credentials, or a malformed sandbox limit.
    pub fn new(config: Config) -> Result<Self> {
        let base_url = config.server.canonical_base_url().to_string();

        let http_client = reqwest::Client::builder()
            .timeout(IDP_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        let auth_server = if config.auth.enabled {
            Some(Arc::new(AuthorizationServer::new(
                config.auth.clone(),
                &base_url,
                http_client,
            )?))
        } else {
            info!("Authentication disabled");
            None
        };

        let auth_gate = auth_server.as_ref().map(|auth| {
            Arc::new(AuthGate::new(auth.token_manager(), auth.store(), &base_url))
        });
        let auth_store = auth_server.as_ref().map(|auth| auth.store());

        let sandbox = create_backend(&config.sandbox)?;
        let execute_tool = ExecutePythonTool::new(Arc::clone(&sandbox), &config);
        let resource_metadata_url =
            format!("{base_url}/.well-known/oauth-protected-resource");
        let tools = Arc::new(ToolRegistry::new(execute_tool, resource_metadata_url));

        info!(
            sandbox_backend = %config.sandbox.backend,
            auth_enabled = config.auth.enabled,
            "Gateway assembled"
        );

        Ok(Self {
            state: Arc::new(AppState {
                auth_server,
                mcp: McpHandler::new(tools),
                streaming: StreamingSessions::new(),
            }),
            auth_gate,
            auth_store,
            sandbox,
            config,
        })
    }

    /// Serve the HTTP transports (Streamable HTTP and SSE on one listener)
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self) -> Result<()> {
        #[cfg(feature = "metrics")]
        if self.config.metrics.enabled {
            observability::install_exporter(self.config.metrics.port)?;
        }

        if let Some(store) = self.auth_store.clone() {
            tokio::spawn(sweep_loop(store));
        }

        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let router = create_router(Arc::clone(&self.state), self.auth_gate.clone());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {addr}: {e}")))?;

        info!(
            addr = %addr,
            base_url = %self.config.server.base_url,
            "Gateway listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Shutting down");
        self.sandbox.cleanup().await;
        Ok(())
    }

    /// Serve MCP over stdin/stdout for embedded use
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing the pipe fails.
    pub async fn run_stdio(self) -> Result<()> {
        info!("Starting stdio transport");
        let result = transport::stdio::run(&self.state.mcp).await;
        self.sandbox.cleanup().await;
        result
    }
}

/// Periodically drop expired codes and sessions, keeping the session gauge
/// current
async fn sweep_loop(store: Arc<AuthStore>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        store.sweep();
        observability::set_active_sessions(store.active_session_count());
        debug!("Swept expired auth entries");
    }
}

/// Resolve on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
