//! Authentication middleware
//!
//! Gates every non-public request: extracts the bearer token, validates it
//! against the canonical audience, resolves the session and user, and
//! attaches the authenticated subject to the request. Every rejection
//! carries a `WWW-Authenticate` challenge pointing at the protected-resource
//! metadata document.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::discovery::format_www_authenticate;
use super::models::{Session, User};
use super::store::AuthStore;
use super::tokens::{TokenClaims, TokenManager, TokenType};
use crate::error::oauth_codes;
use crate::observability;

/// Paths reachable without authentication (exact matches)
pub const PUBLIC_PATHS: [&str; 6] = [
    "/",
    "/health",
    "/ready",
    "/.well-known/oauth-protected-resource",
    "/.well-known/oauth-authorization-server",
    "/.well-known/openid-configuration",
];

/// Path prefixes reachable without authentication
pub const PUBLIC_PREFIXES: [&str; 2] = ["/auth/", "/.well-known/"];

/// Check whether a path is public (bypasses authentication)
#[must_use]
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Authenticated subject attached to requests that pass the gate
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The resolved user
    pub user: User,
    /// The session the presented token belongs to
    pub session: Session,
    /// Verified token claims
    pub claims: TokenClaims,
    /// Parsed scopes
    pub scopes: Vec<String>,
}

impl AuthenticatedUser {
    /// Check whether the subject holds a scope
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// State for the authentication middleware
pub struct AuthGate {
    token_manager: Arc<TokenManager>,
    store: Arc<AuthStore>,
    base_url: String,
    resource_metadata_url: String,
}

impl AuthGate {
    /// Create the gate
    #[must_use]
    pub fn new(token_manager: Arc<TokenManager>, store: Arc<AuthStore>, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            token_manager,
            store,
            resource_metadata_url: format!("{base_url}/.well-known/oauth-protected-resource"),
            base_url,
        }
    }

    /// URL advertised in challenges
    #[must_use]
    pub fn resource_metadata_url(&self) -> &str {
        &self.resource_metadata_url
    }

    fn unauthorized(&self, description: &str) -> Response {
        warn!(error = oauth_codes::INVALID_TOKEN, description, "Authentication failed");
        observability::record_auth_attempt("failure");

        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                format_www_authenticate(
                    &self.resource_metadata_url,
                    None,
                    Some(oauth_codes::INVALID_TOKEN),
                    Some(description),
                ),
            )],
            Json(json!({
                "error": oauth_codes::INVALID_TOKEN,
                "error_description": description,
            })),
        )
            .into_response()
    }

    /// Authenticate a request, returning the subject or a 401 response
    fn authenticate(&self, request: &Request<Body>) -> Result<AuthenticatedUser, Response> {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let Some(auth_header) = auth_header else {
            return Err(self.unauthorized("Missing Authorization header"));
        };

        let Some(token) = auth_header.strip_prefix("Bearer ") else {
            return Err(self.unauthorized("Authorization header must use Bearer scheme"));
        };

        if token.is_empty() {
            return Err(self.unauthorized("Empty Bearer token"));
        }

        let claims = self
            .token_manager
            .validate(token, &self.base_url, TokenType::Access)
            .map_err(|e| self.unauthorized(&e.to_string()))?;

        let session = self
            .store
            .get_session_by_access_jti(&claims.jti)
            .ok_or_else(|| self.unauthorized("Session not found"))?;

        if !session.is_valid() {
            return Err(self.unauthorized("Session has been revoked or expired"));
        }

        let user = self
            .store
            .get_user(&claims.sub)
            .ok_or_else(|| self.unauthorized("User not found"))?;

        let scopes = claims
            .scope
            .split_whitespace()
            .map(ToString::to_string)
            .collect();

        Ok(AuthenticatedUser {
            user,
            session,
            claims,
            scopes,
        })
    }
}

/// Axum middleware enforcing the public-path matrix and bearer validation
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if is_public_path(path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    match gate.authenticate(&request) {
        Ok(auth_user) => {
            debug!(
                user_id = %auth_user.user.id,
                github_login = %auth_user.user.github_login,
                scopes = ?auth_user.scopes,
                path = %request.uri().path(),
                "Request authenticated"
            );
            observability::record_auth_attempt("success");
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(response) => response,
    }
}

/// Scope gate invoked at the top of scope-guarded handlers.
/// Returns a 403 challenge naming the required scope on denial.
pub fn require_scope(
    auth_user: Option<&AuthenticatedUser>,
    scope: &str,
    resource_metadata_url: &str,
) -> Result<(), Response> {
    // No subject means the gate is disabled for this transport; nothing to
    // enforce.
    let Some(auth_user) = auth_user else {
        return Ok(());
    };

    if auth_user.has_scope(scope) {
        return Ok(());
    }

    warn!(
        user_id = %auth_user.user.id,
        required = scope,
        held = ?auth_user.scopes,
        "Scope denied"
    );

    Err((
        StatusCode::FORBIDDEN,
        [(
            header::WWW_AUTHENTICATE,
            format_www_authenticate(
                resource_metadata_url,
                Some(scope),
                Some(oauth_codes::INSUFFICIENT_SCOPE),
                None,
            ),
        )],
        Json(json!({
            "error": oauth_codes::INSUFFICIENT_SCOPE,
            "error_description": format!("Required scope: {scope}"),
        })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{GitHubUser, Session};
    use crate::auth::tokens::TokenType;
    use chrono::Utc;

    #[test]
    fn public_path_matrix() {
        // Exact public paths.
        assert!(is_public_path("/"));
        assert!(is_public_path("/health"));
        assert!(is_public_path("/ready"));
        assert!(is_public_path("/.well-known/oauth-protected-resource"));
        assert!(is_public_path("/.well-known/oauth-authorization-server"));
        assert!(is_public_path("/.well-known/openid-configuration"));

        // Prefixes.
        assert!(is_public_path("/auth/authorize"));
        assert!(is_public_path("/auth/github/callback"));
        assert!(is_public_path("/auth/token"));
        assert!(is_public_path("/.well-known/anything-else"));

        // Everything else is protected.
        assert!(!is_public_path("/mcp"));
        assert!(!is_public_path("/sse"));
        assert!(!is_public_path("/messages/"));
        assert!(!is_public_path("/healthcheck"));
        assert!(!is_public_path("/authx"));
    }

    fn auth_user_with_scopes(scopes: &[&str]) -> AuthenticatedUser {
        let github_user = GitHubUser {
            id: 1,
            login: "octocat".to_string(),
            name: None,
            email: None,
            avatar_url: None,
            organizations: vec![],
        };
        let user = User::from_github_user(&github_user);
        let session = Session::new(
            user.id.clone(),
            "a".to_string(),
            "r".to_string(),
            "client".to_string(),
            scopes.join(" "),
            "https://gw.example".to_string(),
        );
        AuthenticatedUser {
            claims: TokenClaims {
                jti: "a".to_string(),
                sub: user.id.clone(),
                aud: "https://gw.example".to_string(),
                iss: "https://gw.example".to_string(),
                iat: Utc::now(),
                exp: Utc::now(),
                scope: scopes.join(" "),
                client_id: "client".to_string(),
                token_type: TokenType::Access,
            },
            user,
            session,
            scopes: scopes.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn scope_check() {
        let auth_user = auth_user_with_scopes(&["execute_python", "read_resources"]);
        assert!(auth_user.has_scope("execute_python"));
        assert!(!auth_user.has_scope("get_output_file"));
    }

    #[test]
    fn require_scope_passes_holder() {
        let auth_user = auth_user_with_scopes(&["execute_python"]);
        assert!(require_scope(Some(&auth_user), "execute_python", "https://gw.example/meta").is_ok());
    }

    #[test]
    fn require_scope_denies_with_403() {
        let auth_user = auth_user_with_scopes(&["read_resources"]);
        let response =
            require_scope(Some(&auth_user), "execute_python", "https://gw.example/meta")
                .unwrap_err();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("insufficient_scope"));
        assert!(challenge.contains("scope=\"execute_python\""));
    }

    #[test]
    fn require_scope_skips_when_gate_disabled() {
        assert!(require_scope(None, "execute_python", "https://gw.example/meta").is_ok());
    }
}
