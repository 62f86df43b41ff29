use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::CacheScope;

/// Identity of a cached page.
///
/// Built from request-time information only, never from response content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &str, scope: CacheScope, instance_id: &str) -> Self {
        match scope {
            CacheScope::Shared => Self(url.to_string()),
            CacheScope::User => {
                // Length prefix keeps the url/caller boundary unambiguous.
                let mut hasher = Sha256::new();
                hasher.update((url.len() as u64).to_be_bytes());
                hasher.update(url.as_bytes());
                hasher.update(instance_id.as_bytes());
                Self(hex::encode(hasher.finalize()))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
