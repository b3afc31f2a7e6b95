//! In-memory auth store
//!
//! Single source of truth for users, sessions, authorization codes, and
//! pending authorizations. All mutation goes through this type; reverse
//! indices (jti -> session) are kept consistent under one write lock, so
//! readers never observe a partially rotated session.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::models::{AuthorizationCode, PendingAuthorization, Session, User};

#[derive(Default)]
struct StoreInner {
    users: HashMap<String, User>,
    users_by_github_id: HashMap<i64, String>,
    sessions: HashMap<String, Session>,
    sessions_by_access_jti: HashMap<String, String>,
    sessions_by_refresh_jti: HashMap<String, String>,
    authorization_codes: HashMap<String, AuthorizationCode>,
    pending_authorizations: HashMap<String, PendingAuthorization>,
}

/// Process-lifetime store for all auth-domain entities
#[derive(Default)]
pub struct AuthStore {
    inner: RwLock<StoreInner>,
}

impl AuthStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------

    /// Get a user by local id
    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.inner.read().users.get(user_id).cloned()
    }

    /// Get a user by GitHub id
    pub fn get_user_by_github_id(&self, github_id: i64) -> Option<User> {
        let inner = self.inner.read();
        inner
            .users_by_github_id
            .get(&github_id)
            .and_then(|id| inner.users.get(id))
            .cloned()
    }

    /// Save or update a user, keeping the github-id index in sync
    pub fn save_user(&self, user: User) {
        let mut inner = self.inner.write();
        inner.users_by_github_id.insert(user.github_id, user.id.clone());
        inner.users.insert(user.id.clone(), user);
    }

    /// Replace a user's organization set
    pub fn update_user_orgs(&self, user_id: &str, organizations: Vec<String>) {
        let mut inner = self.inner.write();
        if let Some(user) = inner.users.get_mut(user_id) {
            user.organizations = organizations;
            user.updated_at = Utc::now();
        }
    }

    // -------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------

    /// Get a session by id
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.inner.read().sessions.get(session_id).cloned()
    }

    /// Get a session by its current access-token jti
    pub fn get_session_by_access_jti(&self, jti: &str) -> Option<Session> {
        let inner = self.inner.read();
        inner
            .sessions_by_access_jti
            .get(jti)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    /// Get a session by its current refresh-token jti
    pub fn get_session_by_refresh_jti(&self, jti: &str) -> Option<Session> {
        let inner = self.inner.read();
        inner
            .sessions_by_refresh_jti
            .get(jti)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    /// Save a session and install both jti mappings
    pub fn save_session(&self, session: Session) {
        let mut inner = self.inner.write();
        inner
            .sessions_by_access_jti
            .insert(session.access_token_jti.clone(), session.id.clone());
        inner
            .sessions_by_refresh_jti
            .insert(session.refresh_token_jti.clone(), session.id.clone());
        inner.sessions.insert(session.id.clone(), session);
    }

    /// Mark a session revoked
    pub fn revoke_session(&self, session_id: &str) {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.revoked = true;
        }
    }

    /// Rotate a session's token jtis in one step: old mappings are removed
    /// before the new ones are installed, so a token from the previous pair
    /// can never resolve to the session again.
    pub fn rotate_session_tokens(
        &self,
        session_id: &str,
        access_jti: String,
        refresh_jti: String,
    ) {
        let mut inner = self.inner.write();

        let Some(session) = inner.sessions.get(session_id) else {
            return;
        };
        let old_access = session.access_token_jti.clone();
        let old_refresh = session.refresh_token_jti.clone();

        inner.sessions_by_access_jti.remove(&old_access);
        inner.sessions_by_refresh_jti.remove(&old_refresh);

        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.access_token_jti = access_jti.clone();
            session.refresh_token_jti = refresh_jti.clone();
            session.last_used_at = Utc::now();
        }

        inner
            .sessions_by_access_jti
            .insert(access_jti, session_id.to_string());
        inner
            .sessions_by_refresh_jti
            .insert(refresh_jti, session_id.to_string());
    }

    /// Number of currently valid sessions (feeds the sessions gauge)
    pub fn active_session_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.is_valid())
            .count()
    }

    // -------------------------------------------------------------------
    // Authorization codes
    // -------------------------------------------------------------------

    /// Get an authorization code
    pub fn get_authorization_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.inner.read().authorization_codes.get(code).cloned()
    }

    /// Save an authorization code
    pub fn save_authorization_code(&self, auth_code: AuthorizationCode) {
        self.inner
            .write()
            .authorization_codes
            .insert(auth_code.code.clone(), auth_code);
    }

    /// Mark a code used if it is still present and unused.
    /// Returns false when the code is missing or already used, so concurrent
    /// exchanges of the same code have at most one winner.
    pub fn mark_authorization_code_used(&self, code: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.authorization_codes.get_mut(code) {
            Some(auth_code) if !auth_code.used => {
                auth_code.used = true;
                true
            }
            _ => false,
        }
    }

    /// Delete an authorization code
    pub fn delete_authorization_code(&self, code: &str) {
        self.inner.write().authorization_codes.remove(code);
    }

    // -------------------------------------------------------------------
    // Pending authorizations
    // -------------------------------------------------------------------

    /// Park an authorize request under the state handed to the IdP
    pub fn save_pending_authorization(&self, state: String, pending: PendingAuthorization) {
        self.inner.write().pending_authorizations.insert(state, pending);
    }

    /// Consume a pending authorization (single use)
    pub fn take_pending_authorization(&self, state: &str) -> Option<PendingAuthorization> {
        self.inner.write().pending_authorizations.remove(state)
    }

    // -------------------------------------------------------------------
    // Sweeping
    // -------------------------------------------------------------------

    /// Drop expired codes, sessions, and pending authorizations
    pub fn sweep(&self) {
        let now = Utc::now();
        let mut inner = self.inner.write();

        inner.authorization_codes.retain(|_, code| !code.is_expired());
        inner.pending_authorizations.retain(|_, p| !p.is_expired());

        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| now > s.expires_at)
            .map(|s| s.id.clone())
            .collect();

        for session_id in expired {
            if let Some(session) = inner.sessions.remove(&session_id) {
                inner.sessions_by_access_jti.remove(&session.access_token_jti);
                inner
                    .sessions_by_refresh_jti
                    .remove(&session.refresh_token_jti);
                debug!(session_id = %session_id, "Swept expired session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{GitHubUser, PkceChallenge};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn sample_user() -> User {
        User::from_github_user(&GitHubUser {
            id: 42,
            login: "octocat".to_string(),
            name: Some("Octo Cat".to_string()),
            email: None,
            avatar_url: None,
            organizations: vec!["foo".to_string()],
        })
    }

    fn sample_session(user_id: &str, access: &str, refresh: &str) -> Session {
        Session::new(
            user_id.to_string(),
            access.to_string(),
            refresh.to_string(),
            "client".to_string(),
            "execute_python".to_string(),
            "https://gw.example".to_string(),
        )
    }

    #[test]
    fn user_lookup_by_both_ids() {
        let store = AuthStore::new();
        let user = sample_user();
        let user_id = user.id.clone();
        store.save_user(user);

        assert!(store.get_user(&user_id).is_some());
        let by_github = store.get_user_by_github_id(42).unwrap();
        assert_eq!(by_github.id, user_id);
        assert!(store.get_user_by_github_id(7).is_none());
    }

    #[test]
    fn update_user_orgs_bumps_updated_at() {
        let store = AuthStore::new();
        let user = sample_user();
        let user_id = user.id.clone();
        let before = user.updated_at;
        store.save_user(user);

        store.update_user_orgs(&user_id, vec!["bar".to_string()]);
        let user = store.get_user(&user_id).unwrap();
        assert_eq!(user.organizations, vec!["bar".to_string()]);
        assert!(user.updated_at >= before);
    }

    #[test]
    fn session_lookup_by_jtis() {
        let store = AuthStore::new();
        let session = sample_session("u", "a1", "r1");
        let session_id = session.id.clone();
        store.save_session(session);

        assert_eq!(store.get_session_by_access_jti("a1").unwrap().id, session_id);
        assert_eq!(store.get_session_by_refresh_jti("r1").unwrap().id, session_id);
        assert!(store.get_session_by_access_jti("r1").is_none());
    }

    #[test]
    fn rotation_replaces_jtis_atomically() {
        let store = AuthStore::new();
        let session = sample_session("u", "a1", "r1");
        let session_id = session.id.clone();
        store.save_session(session);

        store.rotate_session_tokens(&session_id, "a2".to_string(), "r2".to_string());

        // Old jtis no longer resolve.
        assert!(store.get_session_by_access_jti("a1").is_none());
        assert!(store.get_session_by_refresh_jti("r1").is_none());

        // New jtis resolve to the same session.
        let session = store.get_session_by_access_jti("a2").unwrap();
        assert_eq!(session.id, session_id);
        assert_eq!(session.refresh_token_jti, "r2");
    }

    #[test]
    fn rotation_of_unknown_session_is_noop() {
        let store = AuthStore::new();
        store.rotate_session_tokens("missing", "a".to_string(), "r".to_string());
        assert!(store.get_session_by_access_jti("a").is_none());
    }

    #[test]
    fn revoked_session_is_invalid() {
        let store = AuthStore::new();
        let session = sample_session("u", "a1", "r1");
        let session_id = session.id.clone();
        store.save_session(session);

        store.revoke_session(&session_id);
        let session = store.get_session(&session_id).unwrap();
        assert!(session.revoked);
        assert!(!session.is_valid());
    }

    #[test]
    fn code_single_use_is_first_writer_wins() {
        let store = AuthStore::new();
        let code = AuthorizationCode::new(
            "client".to_string(),
            "http://localhost:1/cb".to_string(),
            String::new(),
            "https://gw.example".to_string(),
            "u".to_string(),
            PkceChallenge::new("c".to_string()),
            None,
        );
        let code_value = code.code.clone();
        store.save_authorization_code(code);

        assert!(store.mark_authorization_code_used(&code_value));
        assert!(!store.mark_authorization_code_used(&code_value));
        assert!(!store.mark_authorization_code_used("missing"));
    }

    #[test]
    fn pending_authorization_is_consumed_once() {
        let store = AuthStore::new();
        let pending = PendingAuthorization {
            client_id: "c".to_string(),
            redirect_uri: "http://localhost:1/cb".to_string(),
            scope: String::new(),
            state: None,
            code_challenge: "ch".to_string(),
            code_challenge_method: "S256".to_string(),
            resource: "https://gw.example".to_string(),
            created_at: Utc::now(),
        };
        store.save_pending_authorization("state-1".to_string(), pending);

        assert!(store.take_pending_authorization("state-1").is_some());
        assert!(store.take_pending_authorization("state-1").is_none());
    }

    #[test]
    fn sweep_drops_expired_entities_and_indices() {
        let store = AuthStore::new();

        let mut code = AuthorizationCode::new(
            "client".to_string(),
            "http://localhost:1/cb".to_string(),
            String::new(),
            "https://gw.example".to_string(),
            "u".to_string(),
            PkceChallenge::new("c".to_string()),
            None,
        );
        code.expires_at = Utc::now() - Duration::seconds(1);
        let code_value = code.code.clone();
        store.save_authorization_code(code);

        let mut session = sample_session("u", "a1", "r1");
        session.expires_at = Utc::now() - Duration::seconds(1);
        let session_id = session.id.clone();
        store.save_session(session);

        store.sweep();

        assert!(store.get_authorization_code(&code_value).is_none());
        assert!(store.get_session(&session_id).is_none());
        assert!(store.get_session_by_access_jti("a1").is_none());
        assert!(store.get_session_by_refresh_jti("r1").is_none());
    }

    #[test]
    fn active_session_count_ignores_invalid() {
        let store = AuthStore::new();
        store.save_session(sample_session("u", "a1", "r1"));

        let mut revoked = sample_session("u", "a2", "r2");
        revoked.revoked = true;
        store.save_session(revoked);

        assert_eq!(store.active_session_count(), 1);
    }
}
