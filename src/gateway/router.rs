//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer,
};
use tracing::debug;

use super::mcp::{McpHandler, McpOutcome};
use super::streaming::{StreamingSessions, sse_response};
use crate::auth::middleware::{AuthGate, auth_middleware};
use crate::auth::server::{CallbackParams, RevokeParams};
use crate::auth::{AuthenticatedUser, AuthorizationServer};
use crate::error::rpc_codes;
use crate::auth::models::{AuthorizationRequest, TokenRequest};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Session id header for the Streamable HTTP transport
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Shared application state
pub struct AppState {
    /// Authorization server, present when auth is enabled
    pub auth_server: Option<Arc<AuthorizationServer>>,
    /// MCP dispatch
    pub mcp: McpHandler,
    /// Streaming session table
    pub streaming: StreamingSessions,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, auth_gate: Option<Arc<AuthGate>>) -> Router {
    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/mcp", post(mcp_post_handler).get(mcp_subscribe_handler))
        .route("/sse", get(sse_handler))
        .route("/messages/", post(messages_handler));

    if state.auth_server.is_some() {
        router = router
            .route(
                "/.well-known/oauth-protected-resource",
                get(resource_metadata_handler),
            )
            .route(
                "/.well-known/oauth-authorization-server",
                get(server_metadata_handler),
            )
            .route(
                "/.well-known/openid-configuration",
                get(server_metadata_handler),
            )
            .route("/auth/authorize", get(authorize_handler))
            .route("/auth/github/callback", get(github_callback_handler))
            .route("/auth/token", post(token_handler))
            .route("/auth/revoke", post(revoke_handler))
            .route("/auth/userinfo", get(userinfo_handler))
            .route("/auth/login", get(login_handler));
    }

    // Authentication runs before the other layers.
    if let Some(gate) = auth_gate {
        router = router.layer(middleware::from_fn_with_state(gate, auth_middleware));
    }

    router
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn ready_handler() -> impl IntoResponse {
    Json(json!({"status": "ready"}))
}

// ---------------------------------------------------------------------
// OAuth endpoints (registered only when auth is enabled)
// ---------------------------------------------------------------------

fn auth_or_404(state: &AppState) -> Result<&Arc<AuthorizationServer>, Response> {
    state
        .auth_server
        .as_ref()
        .ok_or_else(|| StatusCode::NOT_FOUND.into_response())
}

async fn resource_metadata_handler(State(state): State<Arc<AppState>>) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.protected_resource_metadata(),
        Err(response) => response,
    }
}

async fn server_metadata_handler(State(state): State<Arc<AppState>>) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.authorization_server_metadata(),
        Err(response) => response,
    }
}

async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    query: Query<AuthorizationRequest>,
) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.authorize(query),
        Err(response) => response,
    }
}

async fn github_callback_handler(
    State(state): State<Arc<AppState>>,
    query: Query<CallbackParams>,
) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.github_callback(query).await,
        Err(response) => response,
    }
}

async fn token_handler(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.token(request).await,
        Err(response) => response,
    }
}

async fn revoke_handler(
    State(state): State<Arc<AppState>>,
    Form(params): Form<RevokeParams>,
) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.revoke(&params),
        Err(response) => response,
    }
}

async fn userinfo_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.userinfo(&headers),
        Err(response) => response,
    }
}

async fn login_handler(State(state): State<Arc<AppState>>) -> Response {
    match auth_or_404(&state) {
        Ok(auth) => auth.login_page(),
        Err(response) => response,
    }
}

// ---------------------------------------------------------------------
// MCP transports
// ---------------------------------------------------------------------

/// `POST /mcp` — Streamable HTTP request leg
async fn mcp_post_handler(
    State(state): State<Arc<AppState>>,
    auth_user: Option<Extension<AuthenticatedUser>>,
    Json(body): Json<Value>,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                None,
                rpc_codes::INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ))
            .into_response();
        }
    };

    let auth_user = auth_user.as_ref().map(|Extension(user)| user);
    match state.mcp.handle(request, auth_user).await {
        McpOutcome::Response(response) => Json(response).into_response(),
        McpOutcome::None => StatusCode::ACCEPTED.into_response(),
        McpOutcome::Http(response) => *response,
    }
}

/// `GET /mcp` — Streamable HTTP subscription leg
async fn mcp_subscribe_handler(State(state): State<Arc<AppState>>) -> Response {
    let (session_id, rx, guard) = state.streaming.create();
    debug!(session_id = %session_id, "Streamable HTTP subscription");

    (
        [(MCP_SESSION_ID_HEADER, session_id)],
        sse_response(rx, None, guard),
    )
        .into_response()
}

/// `GET /sse` — legacy SSE transport; first event names the POST endpoint
async fn sse_handler(State(state): State<Arc<AppState>>) -> Response {
    let (session_id, rx, guard) = state.streaming.create();
    let endpoint = format!("/messages/?session_id={session_id}");
    sse_response(rx, Some(endpoint), guard).into_response()
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: String,
}

/// `POST /messages/` — request leg of the SSE transport; responses flow
/// back over the session's stream
async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
    auth_user: Option<Extension<AuthenticatedUser>>,
    Json(body): Json<Value>,
) -> Response {
    if !state.streaming.contains(&query.session_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown session"})),
        )
            .into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Invalid request: {e}")})),
            )
                .into_response();
        }
    };

    let auth_user = auth_user.as_ref().map(|Extension(user)| user);
    match state.mcp.handle(request, auth_user).await {
        McpOutcome::Response(response) => {
            match serde_json::to_value(&response) {
                Ok(value) => {
                    state.streaming.send(&query.session_id, value);
                }
                Err(e) => debug!(error = %e, "Failed to encode response for stream"),
            }
            StatusCode::ACCEPTED.into_response()
        }
        McpOutcome::None => StatusCode::ACCEPTED.into_response(),
        McpOutcome::Http(response) => *response,
    }
}
