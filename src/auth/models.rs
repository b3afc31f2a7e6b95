//! Auth-domain entities: users, sessions, authorization codes, PKCE

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Default authorization-code lifetime
pub const AUTH_CODE_TTL_SECONDS: i64 = 600;

/// Default session lifetime (30 days)
pub const SESSION_TTL_SECONDS: i64 = 2_592_000;

/// GitHub user profile as returned by the IdP
#[derive(Debug, Clone)]
pub struct GitHubUser {
    /// GitHub numeric id
    pub id: i64,
    /// GitHub login handle
    pub login: String,
    /// Display name
    pub name: Option<String>,
    /// Email
    pub email: Option<String>,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Organization logins the user belongs to
    pub organizations: Vec<String>,
}

impl GitHubUser {
    /// Check membership in any of the allowed organizations.
    /// An empty allow list means no policy.
    #[must_use]
    pub fn is_member_of(&self, allowed_orgs: &[String]) -> bool {
        if allowed_orgs.is_empty() {
            return true;
        }
        self.organizations.iter().any(|org| allowed_orgs.contains(org))
    }
}

/// Authenticated user
#[derive(Debug, Clone)]
pub struct User {
    /// Stable local identifier
    pub id: String,
    /// GitHub numeric id
    pub github_id: i64,
    /// GitHub login handle
    pub github_login: String,
    /// Display name
    pub name: Option<String>,
    /// Email
    pub email: Option<String>,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Organization logins, refreshed on every login
    pub organizations: Vec<String>,
    /// First-login timestamp
    pub created_at: DateTime<Utc>,
    /// Last profile refresh
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a local user from a GitHub profile
    #[must_use]
    pub fn from_github_user(github_user: &GitHubUser) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            github_id: github_user.id,
            github_login: github_user.login.clone(),
            name: github_user.name.clone(),
            email: github_user.email.clone(),
            avatar_url: github_user.avatar_url.clone(),
            organizations: github_user.organizations.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh mutable profile fields from a fresh GitHub profile
    pub fn refresh_from(&mut self, github_user: &GitHubUser) {
        self.name = github_user.name.clone();
        self.email = github_user.email.clone();
        self.avatar_url = github_user.avatar_url.clone();
        self.organizations = github_user.organizations.clone();
        self.updated_at = Utc::now();
    }
}

/// PKCE challenge stored at authorize time (method fixed to S256)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// base64url(SHA-256(code_verifier)), no padding
    pub code_challenge: String,
    /// Challenge method; only "S256" is accepted
    pub code_challenge_method: String,
}

impl PkceChallenge {
    /// Create an S256 challenge record
    #[must_use]
    pub fn new(code_challenge: String) -> Self {
        Self {
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    /// Verify a code verifier against the stored challenge.
    /// Comparison is constant-time.
    #[must_use]
    pub fn verify(&self, code_verifier: &str) -> bool {
        if self.code_challenge_method != "S256" {
            return false;
        }

        let digest = Sha256::digest(code_verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(digest);

        expected
            .as_bytes()
            .ct_eq(self.code_challenge.as_bytes())
            .into()
    }
}

/// OAuth 2.1 authorization code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Opaque random code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI bound at authorize time
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: String,
    /// Resource indicator (RFC 8707); becomes the token audience
    pub resource: String,
    /// Authenticated user the code belongs to
    pub user_id: String,
    /// PKCE challenge to verify at exchange time
    pub pkce: PkceChallenge,
    /// Caller state echoed on redirect
    pub state: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Set on first successful exchange; terminal
    pub used: bool,
}

impl AuthorizationCode {
    /// Create a new single-use authorization code
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: String,
        redirect_uri: String,
        scope: String,
        resource: String,
        user_id: String,
        pkce: PkceChallenge,
        state: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            code: generate_token_urlsafe(32),
            client_id,
            redirect_uri,
            scope,
            resource,
            user_id,
            pkce,
            state,
            created_at: now,
            expires_at: now + Duration::seconds(AUTH_CODE_TTL_SECONDS),
            used: false,
        }
    }

    /// Whether the code has passed its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Valid iff not used and not expired
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.used && !self.is_expired()
    }
}

/// Server-side session linking a live token pair to a subject
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier (stable across rotation)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Current access-token jti
    pub access_token_jti: String,
    /// Current refresh-token jti
    pub refresh_token_jti: String,
    /// Client identifier
    pub client_id: String,
    /// Granted scopes
    pub scope: String,
    /// Bound audience (canonical resource URI)
    pub resource: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Last refresh or creation time
    pub last_used_at: DateTime<Utc>,
    /// Set by revocation; terminal
    pub revoked: bool,
}

impl Session {
    /// Create a new session
    #[must_use]
    pub fn new(
        user_id: String,
        access_token_jti: String,
        refresh_token_jti: String,
        client_id: String,
        scope: String,
        resource: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            access_token_jti,
            refresh_token_jti,
            client_id,
            scope,
            resource,
            created_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECONDS),
            last_used_at: now,
            revoked: false,
        }
    }

    /// Valid iff not revoked and not expired
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.revoked && Utc::now() < self.expires_at
    }
}

/// Pending authorization: original authorize parameters parked while the
/// user round-trips through GitHub, keyed by the state we handed GitHub
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// Original client id
    pub client_id: String,
    /// Original redirect URI
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: String,
    /// Caller state to echo back
    pub state: Option<String>,
    /// PKCE challenge from the authorize request
    pub code_challenge: String,
    /// PKCE method from the authorize request
    pub code_challenge_method: String,
    /// Resource indicator
    pub resource: String,
    /// Creation time (entries expire on the code TTL)
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// Whether the pending entry has outlived the code TTL
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::seconds(AUTH_CODE_TTL_SECONDS)
    }
}

/// Parsed authorize-request parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI
    #[serde(default)]
    pub redirect_uri: String,
    /// Must be "code"
    #[serde(default)]
    pub response_type: String,
    /// Requested scopes
    #[serde(default)]
    pub scope: String,
    /// Caller CSRF state
    #[serde(default)]
    pub state: String,
    /// PKCE challenge
    #[serde(default)]
    pub code_challenge: String,
    /// PKCE method; must be "S256"
    #[serde(default)]
    pub code_challenge_method: String,
    /// Resource indicator (RFC 8707)
    #[serde(default)]
    pub resource: String,
}

impl AuthorizationRequest {
    /// Validate the request, returning every violation
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.response_type != "code" {
            errors.push(format!(
                "unsupported_response_type: {}",
                self.response_type
            ));
        }

        if self.code_challenge_method != "S256" {
            errors.push("invalid_request: code_challenge_method must be S256".to_string());
        }

        if self.code_challenge.is_empty() {
            errors.push("invalid_request: code_challenge is required".to_string());
        }

        if self.resource.is_empty() {
            errors.push("invalid_request: resource parameter is required (RFC 8707)".to_string());
        }

        if self.redirect_uri.is_empty() {
            errors.push("invalid_request: redirect_uri is required".to_string());
        }

        errors
    }
}

/// Parsed token-request form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Grant type
    #[serde(default)]
    pub grant_type: String,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (must match the code's)
    pub redirect_uri: Option<String>,
    /// Client id (must match the code's)
    pub client_id: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Resource indicator (must match the code's)
    pub resource: Option<String>,
}

impl TokenRequest {
    /// Validate an authorization_code grant request
    #[must_use]
    pub fn validate_authorization_code(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.code.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: code is required".to_string());
        }
        if self.redirect_uri.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: redirect_uri is required".to_string());
        }
        if self.client_id.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: client_id is required".to_string());
        }
        if self.code_verifier.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: code_verifier is required (PKCE)".to_string());
        }
        if self.resource.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: resource is required (RFC 8707)".to_string());
        }

        errors
    }

    /// Validate a refresh_token grant request
    #[must_use]
    pub fn validate_refresh_token(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.refresh_token.as_deref().unwrap_or_default().is_empty() {
            errors.push("invalid_request: refresh_token is required".to_string());
        }

        errors
    }
}

/// Generate a URL-safe random token with `bytes` bytes of entropy
#[must_use]
pub fn generate_token_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pkce_for(verifier: &str) -> PkceChallenge {
        let digest = Sha256::digest(verifier.as_bytes());
        PkceChallenge::new(URL_SAFE_NO_PAD.encode(digest))
    }

    #[test]
    fn pkce_rfc_7636_vector() {
        // Appendix B of RFC 7636
        let challenge = PkceChallenge::new(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
        );
        assert!(challenge.verify("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"));
        assert!(!challenge.verify("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXkwrong"));
    }

    #[test]
    fn pkce_rejects_non_s256_method() {
        let mut challenge = pkce_for("some-verifier");
        challenge.code_challenge_method = "plain".to_string();
        assert!(!challenge.verify("some-verifier"));
    }

    #[test]
    fn authorization_code_single_use_lifecycle() {
        let mut code = AuthorizationCode::new(
            "client".to_string(),
            "http://localhost:8334/callback".to_string(),
            "execute_python".to_string(),
            "https://gw.example".to_string(),
            "user".to_string(),
            pkce_for("v"),
            None,
        );
        assert!(code.is_valid());

        code.used = true;
        assert!(!code.is_valid());
    }

    #[test]
    fn authorization_code_expiry() {
        let mut code = AuthorizationCode::new(
            "client".to_string(),
            "https://app.example/cb".to_string(),
            String::new(),
            "https://gw.example".to_string(),
            "user".to_string(),
            pkce_for("v"),
            None,
        );
        code.expires_at = Utc::now() - Duration::seconds(1);
        assert!(code.is_expired());
        assert!(!code.is_valid());
    }

    #[test]
    fn session_validity() {
        let mut session = Session::new(
            "user".to_string(),
            "a-jti".to_string(),
            "r-jti".to_string(),
            "client".to_string(),
            "execute_python".to_string(),
            "https://gw.example".to_string(),
        );
        assert!(session.is_valid());

        session.revoked = true;
        assert!(!session.is_valid());

        session.revoked = false;
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!session.is_valid());
    }

    #[test]
    fn github_user_org_membership() {
        let user = GitHubUser {
            id: 1,
            login: "octocat".to_string(),
            name: None,
            email: None,
            avatar_url: None,
            organizations: vec!["foo".to_string()],
        };

        assert!(user.is_member_of(&[]));
        assert!(user.is_member_of(&["foo".to_string()]));
        assert!(!user.is_member_of(&["bar".to_string()]));
    }

    #[test]
    fn authorize_request_validation() {
        let valid = AuthorizationRequest {
            client_id: "c".to_string(),
            redirect_uri: "http://localhost:1234/cb".to_string(),
            response_type: "code".to_string(),
            scope: "execute_python".to_string(),
            state: "s".to_string(),
            code_challenge: "challenge".to_string(),
            code_challenge_method: "S256".to_string(),
            resource: "https://gw.example".to_string(),
        };
        assert!(valid.validate().is_empty());

        let mut bad = valid.clone();
        bad.response_type = "token".to_string();
        assert!(!bad.validate().is_empty());

        let mut bad = valid.clone();
        bad.code_challenge_method = "plain".to_string();
        assert!(!bad.validate().is_empty());

        let mut bad = valid.clone();
        bad.code_challenge = String::new();
        assert!(!bad.validate().is_empty());

        let mut bad = valid.clone();
        bad.resource = String::new();
        assert!(!bad.validate().is_empty());

        let mut bad = valid;
        bad.redirect_uri = String::new();
        assert!(!bad.validate().is_empty());
    }

    #[test]
    fn token_request_validation() {
        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: Some("abc".to_string()),
            redirect_uri: Some("http://localhost:1/cb".to_string()),
            client_id: Some("c".to_string()),
            code_verifier: Some("v".to_string()),
            resource: Some("https://gw.example".to_string()),
            ..TokenRequest::default()
        };
        assert!(request.validate_authorization_code().is_empty());

        let missing = TokenRequest {
            grant_type: "authorization_code".to_string(),
            ..TokenRequest::default()
        };
        assert_eq!(missing.validate_authorization_code().len(), 5);

        let refresh = TokenRequest {
            grant_type: "refresh_token".to_string(),
            refresh_token: Some("tok".to_string()),
            ..TokenRequest::default()
        };
        assert!(refresh.validate_refresh_token().is_empty());

        let missing = TokenRequest {
            grant_type: "refresh_token".to_string(),
            ..TokenRequest::default()
        };
        assert_eq!(missing.validate_refresh_token().len(), 1);
    }

    #[test]
    fn generated_tokens_are_unique_and_urlsafe() {
        let a = generate_token_urlsafe(32);
        let b = generate_token_urlsafe(32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
