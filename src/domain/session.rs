use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-session authentication state.
///
/// Lives only as long as the caller's session; nothing here is written to
/// durable configuration unless a "remember" flag asks for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    /// Values for the configured dynamic login parameters, by index
    pub dynamic_values: Vec<Option<String>>,
    pub cas_authenticated: bool,
    /// Where the next render starts when the caller names no URL
    pub current_url: Option<String>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the origin session has lapsed. A session that never saw any
    /// activity counts as expired.
    pub fn is_expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        match self.last_activity {
            Some(last) => last
                .checked_add_signed(timeout)
                .is_some_and(|deadline| deadline <= now),
            None => true,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
    }

    pub fn dynamic_value(&self, index: usize) -> Option<&str> {
        self.dynamic_values
            .get(index)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }
}
