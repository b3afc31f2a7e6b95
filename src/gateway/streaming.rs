//! Streaming sessions
//!
//! Server-side of both HTTP transports:
//! - `GET /sse` opens a stream whose first event names the companion POST
//!   endpoint; responses to `POST /messages/` flow back over the stream.
//! - `GET /mcp` (Streamable HTTP) opens a subscription stream keyed by the
//!   `Mcp-Session-Id` header.
//!
//! Each connection gets a [`SessionGuard`] that lives inside its SSE body;
//! when the client disconnects and the stream is dropped, the guard removes
//! the session from the table, so entries never outlive their connection.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Buffered messages per session before slow consumers start losing events
const SESSION_BUFFER_SIZE: usize = 256;

/// Client streaming sessions
#[derive(Clone, Default)]
pub struct StreamingSessions {
    sessions: Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>,
}

/// Removes its session from the table when dropped. Owned by the SSE body
/// stream, so teardown follows the connection's lifetime.
pub struct SessionGuard {
    sessions: StreamingSessions,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.session_id);
    }
}

impl StreamingSessions {
    /// Create the session table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session, returning its id, receiver, and teardown guard
    pub fn create(&self) -> (String, broadcast::Receiver<Value>, SessionGuard) {
        let id = format!("gw-{}", Uuid::new_v4());
        let (tx, rx) = broadcast::channel(SESSION_BUFFER_SIZE);
        self.sessions.write().insert(id.clone(), tx);
        info!(session_id = %id, "Created streaming session");

        let guard = SessionGuard {
            sessions: self.clone(),
            session_id: id.clone(),
        };
        (id, rx, guard)
    }

    /// Send a message into a session. Returns false if the session is gone.
    pub fn send(&self, session_id: &str, message: Value) -> bool {
        let sessions = self.sessions.read();
        let Some(tx) = sessions.get(session_id) else {
            return false;
        };
        // A send error only means no receiver is currently attached.
        let _ = tx.send(message);
        true
    }

    /// Whether a session exists
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Remove a session. Reached from [`SessionGuard::drop`] on stream
    /// teardown; a second removal is a no-op.
    pub fn remove(&self, session_id: &str) {
        if self.sessions.write().remove(session_id).is_some() {
            debug!(session_id = %session_id, "Removed streaming session");
        }
    }
}

/// Build an SSE response from a session receiver. When `endpoint` is given,
/// the first event tells the client where to POST its messages (legacy SSE
/// transport contract). The guard rides along in the stream so the session
/// is dropped when the connection closes.
pub fn sse_response(
    mut rx: broadcast::Receiver<Value>,
    endpoint: Option<String>,
    guard: SessionGuard,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let _guard = guard;

        if let Some(endpoint) = endpoint {
            yield Ok(Event::default().event("endpoint").data(endpoint));
        }

        loop {
            match rx.recv().await {
                Ok(message) => {
                    let data = message.to_string();
                    yield Ok(Event::default().event("message").data(data));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
