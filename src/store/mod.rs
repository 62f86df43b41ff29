pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{AuthSession, CacheEntry};

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteStore;

/// Durable storage for persisted cache entries.
pub trait CacheBacking: Send + Sync {
    fn put_page(&self, key: &str, entry: &CacheEntry) -> Result<()>;
    fn get_page(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn delete_page(&self, key: &str) -> Result<()>;
    /// Remove every entry expired at `now`, returning how many went.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Per-caller session records.
///
/// Sessions are expected to be used by one in-flight request at a time; the
/// store itself only guarantees each call is atomic.
pub trait SessionStore: Send + Sync {
    /// The session for `session_id`, or a fresh one.
    fn load(&self, session_id: &str) -> AuthSession;
    fn save(&self, session_id: &str, session: &AuthSession);
}
