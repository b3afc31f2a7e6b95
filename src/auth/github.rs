//! GitHub OAuth bridge
//!
//! GitHub does not implement PKCE; PKCE is enforced at our authorization
//! server, and the GitHub leg is secured with the app's client secret.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::models::GitHubUser;
use crate::config::AuthGitHubConfig;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Error during the GitHub OAuth flow
#[derive(Debug, Error)]
pub enum GitHubOAuthError {
    /// GitHub returned a structured OAuth error object
    #[error("{error}: {error_description}")]
    Provider {
        /// GitHub's error code
        error: String,
        /// GitHub's error description
        error_description: String,
    },

    /// GitHub returned a non-success HTTP status
    #[error("GitHub request failed: HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Network or decode failure
    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// GitHub OAuth token response
#[derive(Debug, Clone)]
pub struct GitHubTokenResponse {
    /// GitHub access token
    pub access_token: String,
    /// Token type (usually "bearer")
    pub token_type: String,
    /// Granted scopes
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponseBody {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrgBody {
    login: String,
}

/// GitHub OAuth client
pub struct GitHubOAuthClient {
    http_client: Client,
    client_id: String,
    client_secret: String,
}

impl GitHubOAuthClient {
    /// Create a GitHub OAuth client from configuration
    #[must_use]
    pub fn new(http_client: Client, config: &AuthGitHubConfig) -> Self {
        Self {
            http_client,
            client_id: config.resolve_client_id(),
            client_secret: config.resolve_client_secret(),
        }
    }

    /// Build the GitHub authorization URL. The caller is responsible for
    /// generating and tracking `state`.
    #[must_use]
    pub fn build_auth_url(&self, redirect_uri: &str, state: &str, scope: &str) -> String {
        // GITHUB_AUTHORIZE_URL is a constant; parsing cannot fail.
        let mut url = Url::parse(GITHUB_AUTHORIZE_URL).expect("valid authorize URL");
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("state", state)
            .append_pair("allow_signup", "false");

        debug!(redirect_uri = %redirect_uri, scope = %scope, "Built GitHub authorization URL");
        url.into()
    }

    /// Exchange an authorization code for a GitHub access token
    ///
    /// # Errors
    ///
    /// Returns a [`GitHubOAuthError`] preserving GitHub's structured error
    /// when the provider rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GitHubTokenResponse, GitHubOAuthError> {
        let response = self
            .http_client
            .post(GITHUB_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "GitHub token exchange failed");
            return Err(GitHubOAuthError::Status {
                status: status.as_u16(),
            });
        }

        let body: TokenResponseBody = response.json().await?;

        if let Some(provider_error) = body.error {
            let description = body.error_description.unwrap_or_default();
            error!(error = %provider_error, description = %description, "GitHub OAuth error");
            return Err(GitHubOAuthError::Provider {
                error: provider_error,
                error_description: description,
            });
        }

        let access_token = body.access_token.ok_or(GitHubOAuthError::Provider {
            error: "invalid_response".to_string(),
            error_description: "Token response missing access_token".to_string(),
        })?;

        Ok(GitHubTokenResponse {
            access_token,
            token_type: body.token_type.unwrap_or_else(|| "bearer".to_string()),
            scope: body.scope.unwrap_or_default(),
        })
    }

    /// Fetch the user profile plus organization memberships
    ///
    /// # Errors
    ///
    /// Returns a [`GitHubOAuthError`] if the profile request fails. A failed
    /// organizations request degrades to an empty org set.
    pub async fn get_user(&self, access_token: &str) -> Result<GitHubUser, GitHubOAuthError> {
        let response = self
            .http_client
            .get(format!("{GITHUB_API_URL}/user"))
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("User-Agent", "mcp-sandbox-gateway")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "GitHub user API failed");
            return Err(GitHubOAuthError::Status {
                status: status.as_u16(),
            });
        }

        let user: UserBody = response.json().await?;
        let organizations = self.fetch_user_organizations(access_token).await;

        info!(
            github_id = user.id,
            login = %user.login,
            orgs = ?organizations,
            "Fetched GitHub user profile"
        );

        Ok(GitHubUser {
            id: user.id,
            login: user.login,
            name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
            organizations,
        })
    }

    /// Re-fetch the user's organization memberships.
    /// Called during refresh-token grants to re-evaluate policy.
    pub async fn refresh_user_orgs(&self, access_token: &str) -> Vec<String> {
        self.fetch_user_organizations(access_token).await
    }

    async fn fetch_user_organizations(&self, access_token: &str) -> Vec<String> {
        let response = self
            .http_client
            .get(format!("{GITHUB_API_URL}/user/orgs"))
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("User-Agent", "mcp-sandbox-gateway")
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = r.status().as_u16(), "Failed to fetch user organizations");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch user organizations");
                return Vec::new();
            }
        };

        match response.json::<Vec<OrgBody>>().await {
            Ok(orgs) => orgs.into_iter().map(|o| o.login).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to parse organizations response");
                Vec::new()
            }
        }
    }
}

/// Generate a cryptographically secure state parameter
#[must_use]
pub fn generate_state() -> String {
    super::models::generate_token_urlsafe(32)
}

/// Validate a redirect URI: loopback hosts may use any scheme, everything
/// else must be HTTPS with a host.
#[must_use]
pub fn validate_redirect_uri(uri: &str) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };

    let host = parsed.host_str().unwrap_or_default();
    if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
        return true;
    }

    parsed.scheme() == "https" && !host.is_empty()
}
