//! OAuth discovery documents
//!
//! Serves RFC 9728 (protected resource metadata) and RFC 8414
//! (authorization server metadata); the latter doubles as the
//! OIDC-compatible configuration document.

use serde::{Deserialize, Serialize};

/// Scopes this resource understands
pub const SUPPORTED_SCOPES: [&str; 3] = ["execute_python", "get_output_file", "read_resources"];

/// OAuth 2.0 Protected Resource Metadata (RFC 9728)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Canonical URI of the resource
    pub resource: String,

    /// Authorization servers that can issue tokens for this resource
    pub authorization_servers: Vec<String>,

    /// Supported bearer token methods
    pub bearer_methods_supported: Vec<String>,

    /// Supported scopes
    pub scopes_supported: Vec<String>,

    /// Documentation URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    /// Build the document for this gateway, which is its own
    /// authorization server.
    #[must_use]
    pub fn for_base_url(base_url: &str) -> Self {
        let resource = base_url.trim_end_matches('/').to_string();
        Self {
            authorization_servers: vec![resource.clone()],
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported: SUPPORTED_SCOPES.iter().map(ToString::to_string).collect(),
            resource_documentation: Some(format!("{resource}/docs")),
            resource,
        }
    }
}

/// OAuth 2.0 Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Token revocation endpoint
    pub revocation_endpoint: String,

    /// Userinfo endpoint
    pub userinfo_endpoint: String,

    /// Supported response types
    pub response_types_supported: Vec<String>,

    /// Supported grant types
    pub grant_types_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    pub code_challenge_methods_supported: Vec<String>,

    /// Supported token endpoint auth methods (public clients only)
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// Supported scopes
    pub scopes_supported: Vec<String>,

    /// MCP extension: clients may identify via a metadata document URL
    pub client_id_metadata_document_supported: bool,
}

impl AuthorizationServerMetadata {
    /// Build the document for this gateway
    #[must_use]
    pub fn for_base_url(base_url: &str) -> Self {
        let issuer = base_url.trim_end_matches('/').to_string();
        Self {
            authorization_endpoint: format!("{issuer}/auth/authorize"),
            token_endpoint: format!("{issuer}/auth/token"),
            revocation_endpoint: format!("{issuer}/auth/revoke"),
            userinfo_endpoint: format!("{issuer}/auth/userinfo"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
            scopes_supported: SUPPORTED_SCOPES.iter().map(ToString::to_string).collect(),
            client_id_metadata_document_supported: true,
            issuer,
        }
    }
}

/// Format a `WWW-Authenticate` header for 401/403 responses
/// (RFC 9728 + RFC 6750)
#[must_use]
pub fn format_www_authenticate(
    resource_metadata_url: &str,
    scope: Option<&str>,
    error: Option<&str>,
    error_description: Option<&str>,
) -> String {
    let mut parts = vec![format!("Bearer resource_metadata=\"{resource_metadata_url}\"")];

    if let Some(scope) = scope {
        parts.push(format!("scope=\"{scope}\""));
    }

    if let Some(error) = error {
        parts.push(format!("error=\"{error}\""));
    }

    if let Some(description) = error_description {
        let safe = description.replace('"', "\\\"");
        parts.push(format!("error_description=\"{safe}\""));
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resource_metadata_points_at_itself() {
        let meta = ProtectedResourceMetadata::for_base_url("https://gw.example/");
        assert_eq!(meta.resource, "https://gw.example");
        assert_eq!(meta.authorization_servers, vec!["https://gw.example"]);
        assert_eq!(meta.bearer_methods_supported, vec!["header"]);
        assert_eq!(
            meta.resource_documentation.as_deref(),
            Some("https://gw.example/docs")
        );
    }

    #[test]
    fn server_metadata_endpoints() {
        let meta = AuthorizationServerMetadata::for_base_url("https://gw.example");
        assert_eq!(meta.issuer, "https://gw.example");
        assert_eq!(meta.authorization_endpoint, "https://gw.example/auth/authorize");
        assert_eq!(meta.token_endpoint, "https://gw.example/auth/token");
        assert_eq!(meta.revocation_endpoint, "https://gw.example/auth/revoke");
        assert_eq!(meta.userinfo_endpoint, "https://gw.example/auth/userinfo");
        assert_eq!(meta.response_types_supported, vec!["code"]);
        assert_eq!(
            meta.grant_types_supported,
            vec!["authorization_code", "refresh_token"]
        );
        assert_eq!(meta.code_challenge_methods_supported, vec!["S256"]);
        assert_eq!(meta.token_endpoint_auth_methods_supported, vec!["none"]);
        assert!(meta.client_id_metadata_document_supported);
    }

    #[test]
    fn www_authenticate_formatting() {
        let header = format_www_authenticate(
            "https://gw.example/.well-known/oauth-protected-resource",
            None,
            Some("invalid_token"),
            Some("Token has expired"),
        );
        assert_eq!(
            header,
            "Bearer resource_metadata=\"https://gw.example/.well-known/oauth-protected-resource\", \
             error=\"invalid_token\", error_description=\"Token has expired\""
        );
    }

    #[test]
    fn www_authenticate_escapes_quotes() {
        let header = format_www_authenticate(
            "https://gw.example/.well-known/oauth-protected-resource",
            None,
            Some("invalid_token"),
            Some("bad \"aud\" claim"),
        );
        assert!(header.contains("error_description=\"bad \\\"aud\\\" claim\""));
    }

    #[test]
    fn www_authenticate_with_scope() {
        let header = format_www_authenticate(
            "https://gw.example/.well-known/oauth-protected-resource",
            Some("execute_python"),
            Some("insufficient_scope"),
            None,
        );
        assert!(header.contains("scope=\"execute_python\""));
        assert!(header.contains("error=\"insufficient_scope\""));
    }
}
