use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::AuthSession;
use crate::store::SessionStore;

/// Session store living in process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, AuthSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session_id: &str) -> AuthSession {
        match self.sessions.lock() {
            Ok(sessions) => sessions.get(session_id).cloned().unwrap_or_default(),
            Err(e) => {
                tracing::error!("Session store lock poisoned: {}", e);
                AuthSession::default()
            }
        }
    }

    fn save(&self, session_id: &str, session: &AuthSession) {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.insert(session_id.to_string(), session.clone());
            }
            Err(e) => tracing::error!("Session store lock poisoned: {}", e),
        }
    }
}
