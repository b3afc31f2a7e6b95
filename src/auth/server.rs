//! OAuth 2.1 authorization server endpoints
//!
//! Implements the authorization-code flow with PKCE (RFC 7636) and
//! audience-bound tokens (RFC 8707), federating authentication to GitHub.

use axum::{
    Json,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::discovery::{
    AuthorizationServerMetadata, ProtectedResourceMetadata, format_www_authenticate,
};
use super::github::{GitHubOAuthClient, generate_state, validate_redirect_uri};
use super::models::{
    AuthorizationCode, AuthorizationRequest, PendingAuthorization, PkceChallenge, Session,
    TokenRequest, User,
};
use super::store::AuthStore;
use super::tokens::{TokenManager, TokenType, TokenValidationError};
use crate::config::AuthConfig;
use crate::error::oauth_codes;
use crate::observability;
use crate::{Error, Result};

/// Metadata documents are stable for the process lifetime
const METADATA_CACHE_CONTROL: &str = "max-age=3600";

/// GitHub scopes needed to read the profile and org memberships
const GITHUB_LOGIN_SCOPE: &str = "read:user read:org";

/// Query parameters GitHub sends to the callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code from GitHub
    pub code: Option<String>,
    /// State we handed GitHub at redirect time
    pub state: Option<String>,
    /// GitHub's error code, if the user denied or the flow failed
    pub error: Option<String>,
    /// GitHub's error description
    #[serde(default)]
    pub error_description: String,
}

/// Form parameters for the revocation endpoint
#[derive(Debug, Deserialize)]
pub struct RevokeParams {
    /// Token to revoke
    pub token: Option<String>,
    /// Hint ignored beyond logging (RFC 7009 allows this)
    #[serde(rename = "token_type_hint")]
    pub _token_type_hint: Option<String>,
}

/// OAuth 2.1 authorization server
pub struct AuthorizationServer {
    config: AuthConfig,
    base_url: String,
    store: Arc<AuthStore>,
    token_manager: Arc<TokenManager>,
    github: GitHubOAuthClient,
    resource_metadata: ProtectedResourceMetadata,
    server_metadata: AuthorizationServerMetadata,
}

impl AuthorizationServer {
    /// Create the authorization server
    ///
    /// # Errors
    ///
    /// Returns a configuration error if GitHub credentials are missing or
    /// the token signing key is invalid.
    pub fn new(config: AuthConfig, base_url: &str, http_client: reqwest::Client) -> Result<Self> {
        let github_config = config.github.as_ref().ok_or_else(|| {
            Error::Config("auth.github is required when auth is enabled".to_string())
        })?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let token_manager = Arc::new(TokenManager::new(&config.tokens)?);
        let github = GitHubOAuthClient::new(http_client, github_config);

        info!(
            base_url = %base_url,
            allowed_orgs = ?config.allowed_orgs,
            "Authorization server initialized"
        );

        Ok(Self {
            resource_metadata: ProtectedResourceMetadata::for_base_url(&base_url),
            server_metadata: AuthorizationServerMetadata::for_base_url(&base_url),
            config,
            base_url,
            store: Arc::new(AuthStore::new()),
            token_manager,
            github,
        })
    }

    /// Shared auth store
    #[must_use]
    pub fn store(&self) -> Arc<AuthStore> {
        Arc::clone(&self.store)
    }

    /// Shared token manager
    #[must_use]
    pub fn token_manager(&self) -> Arc<TokenManager> {
        Arc::clone(&self.token_manager)
    }

    /// URL of the protected-resource metadata document
    #[must_use]
    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.base_url)
    }

    // -------------------------------------------------------------------
    // Well-known documents
    // -------------------------------------------------------------------

    /// `GET /.well-known/oauth-protected-resource`
    pub fn protected_resource_metadata(&self) -> Response {
        cached_json(&self.resource_metadata)
    }

    /// `GET /.well-known/oauth-authorization-server` and
    /// `GET /.well-known/openid-configuration`
    pub fn authorization_server_metadata(&self) -> Response {
        cached_json(&self.server_metadata)
    }

    // -------------------------------------------------------------------
    // Authorization flow
    // -------------------------------------------------------------------

    /// `GET /auth/authorize` — validate the request and redirect to GitHub
    pub fn authorize(&self, Query(request): Query<AuthorizationRequest>) -> Response {
        let errors = request.validate();
        if !errors.is_empty() {
            return oauth_error(oauth_codes::INVALID_REQUEST, errors.join("; "));
        }

        if !validate_redirect_uri(&request.redirect_uri) {
            return oauth_error(oauth_codes::INVALID_REQUEST, "Invalid redirect_uri");
        }

        let github_state = generate_state();
        self.store.save_pending_authorization(
            github_state.clone(),
            PendingAuthorization {
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri,
                scope: request.scope.clone(),
                state: (!request.state.is_empty()).then_some(request.state),
                code_challenge: request.code_challenge,
                code_challenge_method: request.code_challenge_method,
                resource: request.resource,
                created_at: Utc::now(),
            },
        );

        let callback_uri = format!("{}/auth/github/callback", self.base_url);
        let github_url =
            self.github
                .build_auth_url(&callback_uri, &github_state, GITHUB_LOGIN_SCOPE);

        info!(
            client_id = %request.client_id,
            scope = %request.scope,
            "Starting authorization flow"
        );

        Redirect::to(&github_url).into_response()
    }

    /// `GET /auth/github/callback` — finish the GitHub round-trip, mint a
    /// local authorization code, and send the user back to the client
    pub async fn github_callback(&self, Query(params): Query<CallbackParams>) -> Response {
        if let Some(provider_error) = params.error {
            warn!(
                error = %provider_error,
                description = %params.error_description,
                "GitHub OAuth error"
            );
            observability::record_auth_attempt("failure");
            return html_error(
                StatusCode::BAD_REQUEST,
                "Authentication Failed",
                &format!("{provider_error}: {}", params.error_description),
            );
        }

        let (Some(code), Some(state)) = (params.code, params.state) else {
            return html_error(
                StatusCode::BAD_REQUEST,
                "Error",
                "Missing code or state parameter",
            );
        };

        let Some(pending) = self.store.take_pending_authorization(&state) else {
            warn!(state = %state, "Invalid state in callback");
            return html_error(StatusCode::BAD_REQUEST, "Error", "Invalid or expired state");
        };

        let callback_uri = format!("{}/auth/github/callback", self.base_url);

        let github_user = match self.github.exchange_code(&code, &callback_uri).await {
            Ok(token) => match self.github.get_user(&token.access_token).await {
                Ok(user) => user,
                Err(e) => {
                    warn!(error = %e, "GitHub profile fetch failed");
                    observability::record_auth_attempt("failure");
                    return html_error(
                        StatusCode::BAD_REQUEST,
                        "Authentication Failed",
                        "Could not fetch your GitHub profile.",
                    );
                }
            },
            Err(e) => {
                warn!(error = %e, "GitHub code exchange failed");
                observability::record_auth_attempt("failure");
                return html_error(
                    StatusCode::BAD_REQUEST,
                    "Authentication Failed",
                    "GitHub did not accept the authorization code.",
                );
            }
        };

        // Organization policy. The denial page must not reveal which orgs
        // are permitted or which the user holds.
        if !github_user.is_member_of(&self.config.allowed_orgs) {
            warn!(
                github_login = %github_user.login,
                "User not in allowed organizations"
            );
            observability::record_auth_attempt("invalid_org");
            return html_error(
                StatusCode::FORBIDDEN,
                "Access Denied",
                "You are not authorized to access this resource. \
                 Please contact your administrator if you believe this is an error.",
            );
        }

        // Upsert the user, refreshing the profile and org set.
        let user = match self.store.get_user_by_github_id(github_user.id) {
            Some(mut user) => {
                user.refresh_from(&github_user);
                self.store.save_user(user.clone());
                user
            }
            None => {
                let user = User::from_github_user(&github_user);
                self.store.save_user(user.clone());
                user
            }
        };

        let auth_code = AuthorizationCode::new(
            pending.client_id.clone(),
            pending.redirect_uri.clone(),
            pending.scope,
            pending.resource,
            user.id.clone(),
            PkceChallenge {
                code_challenge: pending.code_challenge,
                code_challenge_method: pending.code_challenge_method,
            },
            pending.state.clone(),
        );
        let code_value = auth_code.code.clone();
        self.store.save_authorization_code(auth_code);

        info!(
            github_login = %github_user.login,
            user_id = %user.id,
            client_id = %pending.client_id,
            "Authorization successful"
        );
        observability::record_auth_attempt("success");

        let Ok(mut redirect_url) = Url::parse(&pending.redirect_uri) else {
            return html_error(StatusCode::BAD_REQUEST, "Error", "Invalid redirect URI");
        };
        {
            let mut pairs = redirect_url.query_pairs_mut();
            pairs.append_pair("code", &code_value);
            if let Some(ref client_state) = pending.state {
                pairs.append_pair("state", client_state);
            }
        }

        Redirect::to(redirect_url.as_str()).into_response()
    }

    // -------------------------------------------------------------------
    // Token endpoint
    // -------------------------------------------------------------------

    /// `POST /auth/token` — authorization_code and refresh_token grants
    pub async fn token(&self, request: TokenRequest) -> Response {
        match request.grant_type.as_str() {
            "authorization_code" => self.authorization_code_grant(&request),
            "refresh_token" => self.refresh_token_grant(&request),
            other => oauth_error(
                oauth_codes::UNSUPPORTED_GRANT_TYPE,
                format!("Grant type '{other}' is not supported"),
            ),
        }
    }

    fn authorization_code_grant(&self, request: &TokenRequest) -> Response {
        let errors = request.validate_authorization_code();
        if !errors.is_empty() {
            return oauth_error(oauth_codes::INVALID_REQUEST, errors.join("; "));
        }

        // Presence checked by validation above.
        let code = request.code.as_deref().unwrap_or_default();
        let Some(auth_code) = self.store.get_authorization_code(code) else {
            return oauth_error(oauth_codes::INVALID_GRANT, "Invalid authorization code");
        };

        if !auth_code.is_valid() {
            self.store.delete_authorization_code(code);
            return oauth_error(
                oauth_codes::INVALID_GRANT,
                "Authorization code expired or already used",
            );
        }

        // Binding checks against the values stored at authorize time.
        if request.client_id.as_deref() != Some(auth_code.client_id.as_str()) {
            return oauth_error(oauth_codes::INVALID_GRANT, "Client ID mismatch");
        }
        if request.redirect_uri.as_deref() != Some(auth_code.redirect_uri.as_str()) {
            return oauth_error(oauth_codes::INVALID_GRANT, "Redirect URI mismatch");
        }
        if request.resource.as_deref() != Some(auth_code.resource.as_str()) {
            return oauth_error(oauth_codes::INVALID_TARGET, "Resource mismatch");
        }

        let verifier = request.code_verifier.as_deref().unwrap_or_default();
        if !auth_code.pkce.verify(verifier) {
            return oauth_error(oauth_codes::INVALID_GRANT, "Invalid code_verifier (PKCE)");
        }

        // Single use: the first exchange wins, every later one fails here.
        if !self.store.mark_authorization_code_used(code) {
            return oauth_error(
                oauth_codes::INVALID_GRANT,
                "Authorization code expired or already used",
            );
        }

        let pair = self.token_manager.issue_pair(
            &auth_code.user_id,
            &auth_code.client_id,
            &auth_code.scope,
            &auth_code.resource,
        );
        let (access_token, access_jti, refresh_token, refresh_jti) = match pair {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Token issuance failed");
                return oauth_error(oauth_codes::SERVER_ERROR, "Token issuance failed");
            }
        };

        let session = Session::new(
            auth_code.user_id.clone(),
            access_jti,
            refresh_jti,
            auth_code.client_id.clone(),
            auth_code.scope.clone(),
            auth_code.resource.clone(),
        );
        self.store.save_session(session);
        observability::set_active_sessions(self.store.active_session_count());

        info!(
            user_id = %auth_code.user_id,
            client_id = %auth_code.client_id,
            scope = %auth_code.scope,
            "Tokens issued"
        );

        token_response(
            &access_token,
            &refresh_token,
            self.token_manager.access_token_ttl(),
            &auth_code.scope,
        )
    }

    fn refresh_token_grant(&self, request: &TokenRequest) -> Response {
        let errors = request.validate_refresh_token();
        if !errors.is_empty() {
            return oauth_error(oauth_codes::INVALID_REQUEST, errors.join("; "));
        }

        let refresh_token = request.refresh_token.as_deref().unwrap_or_default();
        let claims = match self
            .token_manager
            .validate(refresh_token, &self.base_url, TokenType::Refresh)
        {
            Ok(claims) => claims,
            Err(TokenValidationError::Expired) => {
                return oauth_error(oauth_codes::INVALID_GRANT, "Refresh token has expired");
            }
            Err(e) => return oauth_error(oauth_codes::INVALID_GRANT, e.to_string()),
        };

        let session = match self.store.get_session_by_refresh_jti(&claims.jti) {
            Some(session) if session.is_valid() => session,
            _ => {
                return oauth_error(
                    oauth_codes::INVALID_GRANT,
                    "Invalid or revoked refresh token",
                );
            }
        };

        let Some(user) = self.store.get_user(&session.user_id) else {
            return oauth_error(oauth_codes::INVALID_GRANT, "User not found");
        };

        // Re-evaluate org policy against the org set captured at login.
        if !self.config.allowed_orgs.is_empty() {
            let is_member = user
                .organizations
                .iter()
                .any(|org| self.config.allowed_orgs.contains(org));
            if !is_member {
                self.store.revoke_session(&session.id);
                observability::set_active_sessions(self.store.active_session_count());
                observability::record_auth_attempt("invalid_org");
                return oauth_error(
                    oauth_codes::INVALID_GRANT,
                    "User is no longer a member of allowed organizations",
                );
            }
        }

        let pair = self.token_manager.issue_pair(
            &user.id,
            &session.client_id,
            &session.scope,
            &session.resource,
        );
        let (access_token, access_jti, refresh_token, refresh_jti) = match pair {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Token issuance failed");
                return oauth_error(oauth_codes::SERVER_ERROR, "Token issuance failed");
            }
        };

        self.store
            .rotate_session_tokens(&session.id, access_jti, refresh_jti);

        info!(user_id = %user.id, client_id = %session.client_id, "Tokens refreshed");

        token_response(
            &access_token,
            &refresh_token,
            self.token_manager.access_token_ttl(),
            &session.scope,
        )
    }

    // -------------------------------------------------------------------
    // Revocation and userinfo
    // -------------------------------------------------------------------

    /// `POST /auth/revoke` — best-effort revocation; always 200 (RFC 7009)
    pub fn revoke(&self, params: &RevokeParams) -> Response {
        if let Some(ref token) = params.token {
            if let Ok(claims) = self.token_manager.decode_unsafe(token) {
                let jti = claims.get("jti").and_then(serde_json::Value::as_str);
                let token_type = claims
                    .get("token_type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("access");

                if let Some(jti) = jti {
                    let session = if token_type == "refresh" {
                        self.store.get_session_by_refresh_jti(jti)
                    } else {
                        self.store.get_session_by_access_jti(jti)
                    };

                    if let Some(session) = session {
                        self.store.revoke_session(&session.id);
                        observability::set_active_sessions(self.store.active_session_count());
                        info!(session_id = %session.id, "Session revoked");
                    }
                }
            }
        }

        Json(json!({})).into_response()
    }

    /// `GET /auth/userinfo` — the current subject's profile
    pub fn userinfo(&self, headers: &HeaderMap) -> Response {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let Some(token) = token else {
            return self.userinfo_unauthorized("Missing or invalid Authorization header");
        };

        let claims = match self
            .token_manager
            .validate(token, &self.base_url, TokenType::Access)
        {
            Ok(claims) => claims,
            Err(e) => return self.userinfo_unauthorized(&e.to_string()),
        };

        let Some(user) = self.store.get_user(&claims.sub) else {
            return self.userinfo_unauthorized("User not found");
        };

        Json(json!({
            "sub": user.id,
            "name": user.name,
            "preferred_username": user.github_login,
            "email": user.email,
            "picture": user.avatar_url,
            "organizations": user.organizations,
        }))
        .into_response()
    }

    fn userinfo_unauthorized(&self, description: &str) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                format_www_authenticate(
                    &self.resource_metadata_url(),
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

    // -------------------------------------------------------------------
    // Login affordance
    // -------------------------------------------------------------------

    /// `GET /auth/login` — browser login page that generates proper PKCE
    /// parameters client-side. The verifier is kept in sessionStorage for
    /// the token exchange.
    pub fn login_page(&self) -> Response {
        // The base URL is embedded as a JSON string so it is always data,
        // never markup or script.
        let resource_json =
            serde_json::to_string(&self.base_url).unwrap_or_else(|_| "\"\"".to_string());
        let html = LOGIN_PAGE.replace("__RESOURCE_JSON__", &resource_json);
        Html(html).into_response()
    }
}

/// JSON body with metadata cache headers
fn cached_json<T: serde::Serialize>(body: &T) -> Response {
    (
        [(header::CACHE_CONTROL, METADATA_CACHE_CONTROL)],
        Json(serde_json::to_value(body).unwrap_or_default()),
    )
        .into_response()
}

/// 400 response with an OAuth error body
fn oauth_error(code: &'static str, description: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": code,
            "error_description": description.into(),
        })),
    )
        .into_response()
}

/// Successful token-endpoint response body
fn token_response(access_token: &str, refresh_token: &str, expires_in: u64, scope: &str) -> Response {
    Json(json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": refresh_token,
        "scope": scope,
    }))
    .into_response()
}

/// Terminal HTML page for browser-facing failures. The message may carry
/// caller- or IdP-supplied text, so it is escaped.
fn html_error(status: StatusCode, title: &str, message: &str) -> Response {
    (
        status,
        Html(format!(
            "<h1>{}</h1><p>{}</p>",
            escape_html(title),
            escape_html(message)
        )),
    )
        .into_response()
}

/// Minimal HTML entity escaping for text nodes
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Sandbox Gateway - Login</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #f6f8fa;
        }
        .container {
            background: white;
            padding: 40px;
            border-radius: 10px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.1);
            text-align: center;
            max-width: 400px;
        }
        h1 { margin-bottom: 10px; color: #333; }
        p { color: #666; margin-bottom: 30px; }
        .github-btn {
            display: inline-flex;
            align-items: center;
            padding: 12px 24px;
            background: #24292e;
            color: white;
            border-radius: 6px;
            font-weight: 500;
            cursor: pointer;
            border: none;
            font-size: 16px;
        }
        .github-btn:hover { background: #2f363d; }
        .note { margin-top: 20px; font-size: 12px; color: #999; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Sandbox Gateway</h1>
        <p>Sign in to run code against your data</p>
        <button id="login-btn" class="github-btn">Sign in with GitHub</button>
        <p class="note">
            Access requires membership in an authorized GitHub organization.
        </p>
    </div>
    <script>
        // PKCE for OAuth 2.1: random verifier, S256 challenge.
        const RESOURCE = __RESOURCE_JSON__;

        function base64UrlEncode(buffer) {
            const base64 = btoa(String.fromCharCode.apply(null, buffer));
            return base64.replace(/\+/g, '-').replace(/\//g, '_').replace(/=+$/, '');
        }

        function generateCodeVerifier() {
            const array = new Uint8Array(32);
            crypto.getRandomValues(array);
            return base64UrlEncode(array);
        }

        async function generateCodeChallenge(codeVerifier) {
            const encoder = new TextEncoder();
            const digest = await crypto.subtle.digest('SHA-256', encoder.encode(codeVerifier));
            return base64UrlEncode(new Uint8Array(digest));
        }

        async function startLogin() {
            const codeVerifier = generateCodeVerifier();
            const codeChallenge = await generateCodeChallenge(codeVerifier);

            const stateArray = new Uint8Array(16);
            crypto.getRandomValues(stateArray);
            const state = base64UrlEncode(stateArray);

            sessionStorage.setItem('pkce_code_verifier', codeVerifier);
            sessionStorage.setItem('oauth_state', state);

            const params = new URLSearchParams({
                response_type: 'code',
                client_id: 'browser',
                redirect_uri: window.location.origin + '/auth/callback-page',
                scope: 'execute_python get_output_file',
                code_challenge: codeChallenge,
                code_challenge_method: 'S256',
                state: state,
                resource: RESOURCE
            });

            window.location.href = '/auth/authorize?' + params.toString();
        }

        document.getElementById('login-btn').addEventListener('click', startLogin);
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthGitHubConfig, AuthTokensConfig};

    fn server() -> AuthorizationServer {
        AuthorizationServer::new(
            AuthConfig {
                enabled: true,
                allowed_orgs: vec![],
                tokens: AuthTokensConfig {
                    secret_key: "0123456789abcdef0123456789abcdef".to_string(),
                    ..AuthTokensConfig::default()
                },
                github: Some(AuthGitHubConfig {
                    client_id: "app".to_string(),
                    client_secret: "secret".to_string(),
                }),
            },
            "https://gw.example/",
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn base_url_is_canonicalized() {
        let server = server();
        assert_eq!(
            server.resource_metadata_url(),
            "https://gw.example/.well-known/oauth-protected-resource"
        );
    }

    #[tokio::test]
    async fn login_page_embeds_resource_as_json() {
        let server = server();
        let response = server.login_page();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        // The base URL lands in the script as a JSON string, and the
        // substitution marker is gone.
        assert!(html.contains("const RESOURCE = \"https://gw.example\";"));
        assert!(!html.contains("__RESOURCE_JSON__"));
    }

    #[test]
    fn html_error_escapes_reflected_text() {
        let response = html_error(
            StatusCode::BAD_REQUEST,
            "Error",
            "<script>alert(1)</script> & \"quotes\"",
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>&\"</script>"),
            "&lt;script&gt;&amp;&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn missing_github_config_is_fatal() {
        let result = AuthorizationServer::new(
            AuthConfig {
                enabled: true,
                tokens: AuthTokensConfig {
                    secret_key: "0123456789abcdef0123456789abcdef".to_string(),
                    ..AuthTokensConfig::default()
                },
                ..AuthConfig::default()
            },
            "https://gw.example",
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
