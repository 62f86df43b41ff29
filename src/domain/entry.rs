use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{ProxyError, Result};

/// `now + lifetime`, or a configuration error when that date cannot be
/// represented.
pub fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(lifetime).ok_or_else(|| {
        ProxyError::Config(format!(
            "Cache lifetime of {}s runs past the supported date range",
            lifetime.num_seconds()
        ))
    })
}

/// A rendered page as the caller received it.
///
/// Entries are never mutated once stored; re-caching replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_type: String,
    pub content: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content,
            expires_at: None,
        }
    }

    /// Template carrying only the metadata a capture will fill in.
    pub fn template(
        content_type: impl Into<String>,
        lifetime: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            content_type: content_type.into(),
            content: Vec::new(),
            expires_at: lifetime.map(|l| expiry_after(now, l)).transpose()?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Copy of this entry with a new expiration.
    pub fn with_expiration(&self, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            expires_at,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_expiry_never_expires() {
        let entry = CacheEntry::new("text/html", b"<p>hi</p>".to_vec());
        assert!(!entry.is_expired(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let entry = CacheEntry::new("text/html", Vec::new()).with_expiration(Some(now));
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn test_template_sets_expiry_from_lifetime() {
        let now = Utc::now();
        let entry = CacheEntry::template("text/html", Some(Duration::seconds(30)), now).unwrap();
        assert_eq!(entry.expires_at, Some(now + Duration::seconds(30)));
        assert!(entry.content.is_empty());
    }

    #[test]
    fn test_template_rejects_unrepresentable_expiry() {
        let lifetime = Duration::try_seconds(i64::MAX / 1000).unwrap();
        let err = CacheEntry::template("text/html", Some(lifetime), Utc::now()).unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }
}
