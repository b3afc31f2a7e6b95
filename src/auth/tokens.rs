//! Signed-token issuance and validation
//!
//! Tokens are HS256 JWTs bound to a single audience (RFC 8707). Validation
//! always checks issuer, signature, expiry, token type, and audience, and
//! reports each failure as a distinct variant so callers can map them to
//! the right OAuth error.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthTokensConfig;
use crate::{Error, Result};

/// Minimum signing-key length in bytes
const MIN_SECRET_LEN: usize = 32;

/// Token type discriminator carried in the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer token accepted by the resource
    Access,
    /// Long-lived token accepted only by the token endpoint
    Refresh,
}

impl TokenType {
    /// Claim value for this token type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token validation failure, one variant per distinguishable cause
#[derive(Debug, Error)]
pub enum TokenValidationError {
    /// The token's `exp` is in the past
    #[error("Token has expired")]
    Expired,

    /// The token's `aud` does not match the expected audience
    #[error("Token audience '{actual}' does not match expected audience '{expected}'")]
    AudienceMismatch {
        /// Audience the resource expected
        expected: String,
        /// Audience the token carries
        actual: String,
    },

    /// The token was minted by a different issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// The token is of the wrong type for this context
    #[error("Expected {expected} token, got {actual}")]
    WrongType {
        /// Type the caller required
        expected: TokenType,
        /// Type the token carries
        actual: TokenType,
    },

    /// The token could not be parsed or its signature is bad
    #[error("Invalid token: {0}")]
    Malformed(String),

    /// The caller did not supply an expected audience
    #[error("expected_audience is required for token validation")]
    MissingAudience,
}

/// Raw JWT claims as encoded on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawClaims {
    jti: String,
    sub: String,
    aud: String,
    iss: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    client_id: String,
    token_type: TokenType,
}

/// Decoded and verified token claims
#[derive(Debug, Clone)]
pub struct TokenClaims {
    /// Token identifier (maps to a session)
    pub jti: String,
    /// Subject (local user id)
    pub sub: String,
    /// Audience (canonical resource URI)
    pub aud: String,
    /// Issuer
    pub iss: String,
    /// Issued at
    pub iat: DateTime<Utc>,
    /// Expiry
    pub exp: DateTime<Utc>,
    /// Space-separated scopes
    pub scope: String,
    /// OAuth client id the token was issued to
    pub client_id: String,
    /// Access or refresh
    pub token_type: TokenType,
}

impl TokenClaims {
    fn from_raw(raw: RawClaims) -> Self {
        Self {
            jti: raw.jti,
            sub: raw.sub,
            aud: raw.aud,
            iss: raw.iss,
            iat: DateTime::from_timestamp(raw.iat, 0).unwrap_or_default(),
            exp: DateTime::from_timestamp(raw.exp, 0).unwrap_or_default(),
            scope: raw.scope,
            client_id: raw.client_id,
            token_type: raw.token_type,
        }
    }
}

/// Strip the trailing slash so audience comparison is byte-exact
#[must_use]
pub fn canonicalize_audience(audience: &str) -> &str {
    audience.trim_end_matches('/')
}

/// Issues and validates audience-bound JWTs
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_ttl: u64,
    refresh_token_ttl: u64,
}

impl TokenManager {
    /// Create a token manager from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the signing key is unset or shorter
    /// than 32 bytes.
    pub fn new(config: &AuthTokensConfig) -> Result<Self> {
        let secret = config.resolve_secret_key();
        if secret.is_empty() {
            return Err(Error::Config(
                "auth.tokens.secret_key is required; generate one with: \
                 openssl rand -base64 32"
                    .to_string(),
            ));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "auth.tokens.secret_key must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }

        debug!(issuer = %config.issuer, "Token manager initialized");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
        })
    }

    /// Access token TTL in seconds
    #[must_use]
    pub fn access_token_ttl(&self) -> u64 {
        self.access_token_ttl
    }

    /// Refresh token TTL in seconds
    #[must_use]
    pub fn refresh_token_ttl(&self) -> u64 {
        self.refresh_token_ttl
    }

    fn create_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &str,
        resource: &str,
        token_type: TokenType,
        ttl_seconds: i64,
    ) -> Result<(String, String)> {
        let jti = Uuid::new_v4().to_string();
        let now = Utc::now();
        let exp = now + Duration::seconds(ttl_seconds);

        let claims = RawClaims {
            jti: jti.clone(),
            sub: user_id.to_string(),
            aud: canonicalize_audience(resource).to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            scope: scope.to_string(),
            client_id: client_id.to_string(),
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))?;

        debug!(
            jti = %jti,
            user_id = %user_id,
            client_id = %client_id,
            token_type = %token_type,
            expires_in = ttl_seconds,
            "Created token"
        );

        Ok((token, jti))
    }

    /// Create an access/refresh pair bound to the same audience
    ///
    /// Returns `(access_token, access_jti, refresh_token, refresh_jti)`.
    pub fn issue_pair(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &str,
        resource: &str,
    ) -> Result<(String, String, String, String)> {
        let ttl = i64::try_from(self.access_token_ttl).unwrap_or(i64::MAX);
        let (access_token, access_jti) =
            self.create_token(user_id, client_id, scope, resource, TokenType::Access, ttl)?;

        let ttl = i64::try_from(self.refresh_token_ttl).unwrap_or(i64::MAX);
        let (refresh_token, refresh_jti) =
            self.create_token(user_id, client_id, scope, resource, TokenType::Refresh, ttl)?;

        Ok((access_token, access_jti, refresh_token, refresh_jti))
    }

    /// Validate a token against an expected audience and type
    ///
    /// # Errors
    ///
    /// Returns a [`TokenValidationError`] naming the exact failure: expiry,
    /// audience mismatch, wrong issuer, wrong type, or a malformed token.
    pub fn validate(
        &self,
        token: &str,
        expected_audience: &str,
        expected_type: TokenType,
    ) -> std::result::Result<TokenClaims, TokenValidationError> {
        if expected_audience.is_empty() {
            return Err(TokenValidationError::MissingAudience);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        // Audience is checked manually below for a distinguishable error.
        validation.validate_aud = false;

        let raw = decode::<RawClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    TokenValidationError::InvalidIssuer
                }
                _ => TokenValidationError::Malformed(e.to_string()),
            })?;

        if raw.token_type != expected_type {
            return Err(TokenValidationError::WrongType {
                expected: expected_type,
                actual: raw.token_type,
            });
        }

        let expected = canonicalize_audience(expected_audience);
        if raw.aud != expected {
            warn!(expected = %expected, actual = %raw.aud, "Token audience mismatch");
            return Err(TokenValidationError::AudienceMismatch {
                expected: expected.to_string(),
                actual: raw.aud,
            });
        }

        Ok(TokenClaims::from_raw(raw))
    }

    /// Decode a token's payload without any verification
    ///
    /// For diagnostics and best-effort revocation only; never use the result
    /// to authorize anything.
    pub fn decode_unsafe(
        &self,
        token: &str,
    ) -> std::result::Result<serde_json::Value, TokenValidationError> {
        // Split the JWT into parts and base64-decode the payload; no
        // signature or claim checks.
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| TokenValidationError::Malformed("Not a JWT".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manager_for(issuer: &str) -> TokenManager {
        TokenManager::new(&AuthTokensConfig {
            secret_key: "0123456789abcdef0123456789abcdef".to_string(),
            issuer: issuer.to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: 2_592_000,
        })
        .unwrap()
    }

    fn manager() -> TokenManager {
        manager_for("https://gw.example")
    }

    #[test]
    fn rejects_empty_secret() {
        let result = TokenManager::new(&AuthTokensConfig {
            secret_key: String::new(),
            issuer: "https://gw.example".to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: 2_592_000,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_short_secret() {
        let result = TokenManager::new(&AuthTokensConfig {
            secret_key: "too-short".to_string(),
            issuer: "https://gw.example".to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: 2_592_000,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn issue_and_validate_roundtrip() {
        let mgr = manager();
        let (access, access_jti, refresh, refresh_jti) = mgr
            .issue_pair("user-1", "client-1", "execute_python", "https://gw.example")
            .unwrap();

        let claims = mgr
            .validate(&access, "https://gw.example", TokenType::Access)
            .unwrap();
        assert_eq!(claims.jti, access_jti);
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.aud, "https://gw.example");
        assert_eq!(claims.iss, "https://gw.example");
        assert_eq!(claims.scope, "execute_python");
        assert_eq!(claims.client_id, "client-1");
        assert_eq!(claims.token_type, TokenType::Access);

        let claims = mgr
            .validate(&refresh, "https://gw.example", TokenType::Refresh)
            .unwrap();
        assert_eq!(claims.jti, refresh_jti);
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn audience_is_canonicalized() {
        let mgr = manager();
        let (access, _, _, _) = mgr
            .issue_pair("u", "c", "", "https://gw.example/")
            .unwrap();
        // Minted with a trailing slash, validated without one.
        let claims = mgr
            .validate(&access, "https://gw.example", TokenType::Access)
            .unwrap();
        assert_eq!(claims.aud, "https://gw.example");
    }

    #[test]
    fn rejects_wrong_audience() {
        let mgr = manager();
        let (access, _, _, _) = mgr.issue_pair("u", "c", "", "https://gw.example").unwrap();

        let err = mgr
            .validate(&access, "https://other.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::AudienceMismatch { .. }));
    }

    #[test]
    fn rejects_empty_expected_audience() {
        let mgr = manager();
        let (access, _, _, _) = mgr.issue_pair("u", "c", "", "https://gw.example").unwrap();

        let err = mgr.validate(&access, "", TokenType::Access).unwrap_err();
        assert!(matches!(err, TokenValidationError::MissingAudience));
    }

    #[test]
    fn rejects_wrong_token_type() {
        let mgr = manager();
        let (access, _, refresh, _) =
            mgr.issue_pair("u", "c", "", "https://gw.example").unwrap();

        let err = mgr
            .validate(&access, "https://gw.example", TokenType::Refresh)
            .unwrap_err();
        assert!(matches!(
            err,
            TokenValidationError::WrongType {
                expected: TokenType::Refresh,
                actual: TokenType::Access,
            }
        ));

        let err = mgr
            .validate(&refresh, "https://gw.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::WrongType { .. }));
    }

    #[test]
    fn rejects_expired_token() {
        let mgr = manager();
        let (token, _) = mgr
            .create_token("u", "c", "", "https://gw.example", TokenType::Access, -10)
            .unwrap();

        let err = mgr
            .validate(&token, "https://gw.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Expired));
    }

    #[test]
    fn rejects_foreign_issuer() {
        let ours = manager_for("https://gw.example");
        let theirs = manager_for("https://rogue.example");

        let (token, _, _, _) = theirs
            .issue_pair("u", "c", "", "https://gw.example")
            .unwrap();

        let err = ours
            .validate(&token, "https://gw.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::InvalidIssuer));
    }

    #[test]
    fn rejects_tampered_token() {
        let mgr = manager();
        let (access, _, _, _) = mgr.issue_pair("u", "c", "", "https://gw.example").unwrap();

        let mut tampered = access.clone();
        tampered.pop();
        tampered.push('A');

        let err = mgr
            .validate(&tampered, "https://gw.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn rejects_garbage() {
        let mgr = manager();
        let err = mgr
            .validate("not-a-jwt", "https://gw.example", TokenType::Access)
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn decode_unsafe_returns_claims_without_verification() {
        let mgr = manager();
        let (token, _) = mgr
            .create_token("u", "c", "s", "https://gw.example", TokenType::Access, -10)
            .unwrap();

        // Expired token still decodes.
        let claims = mgr.decode_unsafe(&token).unwrap();
        assert_eq!(claims["sub"], "u");
        assert_eq!(claims["token_type"], "access");
    }
}
