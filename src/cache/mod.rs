//! Rendered-page cache.
//!
//! Entries live in a bounded in-memory LRU; entries stored with `persist`
//! also go to the durable [`CacheBacking`]. Expiry is lazy: nothing is
//! evicted on a timer, lookups just refuse expired entries unless the caller
//! asks for stale content.

pub mod capture;
pub mod flight;
pub mod key;

pub use capture::CaptureWriter;
pub use flight::{FlightGuard, SingleFlight};
pub use key::CacheKey;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::CacheEntry;
use crate::store::CacheBacking;

pub struct PageCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    backing: Option<Arc<dyn CacheBacking>>,
}

impl PageCache {
    pub fn new(max_entries: usize, backing: Option<Arc<dyn CacheBacking>>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            backing,
        }
    }

    /// Volatile cache with no durable backing.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(max_entries, None)
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &CacheKey, allow_stale: bool) -> Option<CacheEntry> {
        self.lookup_at(key, allow_stale, Utc::now())
    }

    /// Look `key` up as of `now`. A failing backing store reads as a miss.
    pub fn lookup_at(
        &self,
        key: &CacheKey,
        allow_stale: bool,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        let cached = self.entries().get(key).cloned();

        let entry = match cached {
            Some(entry) => entry,
            None => {
                let backing = self.backing.as_ref()?;
                match backing.get_page(key.as_str()) {
                    Ok(Some(entry)) => {
                        self.entries().put(key.clone(), entry.clone());
                        entry
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Cache backing lookup failed for {}: {}", key, e);
                        return None;
                    }
                }
            }
        };

        if !allow_stale && entry.is_expired(now) {
            debug!("Cache entry {} expired at {:?}", key, entry.expires_at);
            return None;
        }

        debug!("Cache hit for {} (stale allowed: {})", key, allow_stale);
        Some(entry)
    }

    /// Store `entry` under `key`, replacing whatever was there. A volatile
    /// store also drops any durable copy so an older page cannot resurface
    /// after eviction.
    pub fn store(&self, key: &CacheKey, entry: CacheEntry, persist: bool) {
        match (&self.backing, persist) {
            (Some(backing), true) => {
                if let Err(e) = backing.put_page(key.as_str(), &entry) {
                    warn!("Failed to persist cache entry {}: {}", key, e);
                }
            }
            (Some(backing), false) => {
                if let Err(e) = backing.delete_page(key.as_str()) {
                    warn!("Failed to drop durable copy of {}: {}", key, e);
                }
            }
            (None, true) => debug!("No durable cache configured; {} stays in memory", key),
            (None, false) => {}
        }

        self.entries().put(key.clone(), entry);
    }

    /// Drop every entry expired at `now`, in memory and in the backing store.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<CacheKey> = self
            .entries()
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        {
            let mut entries = self.entries();
            for key in &expired {
                if entries.pop(key).is_some() {
                    removed += 1;
                }
            }
        }

        if let Some(backing) = &self.backing {
            removed += backing.purge_expired(now)?;
        }

        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tee `writer` so that everything written through it is stored under
    /// `key` once the write completes cleanly.
    pub fn capture<'a, W>(
        &'a self,
        writer: &'a mut W,
        template: CacheEntry,
        key: CacheKey,
        persist: bool,
    ) -> CaptureWriter<'a, W>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        CaptureWriter::new(self, writer, template, key, persist)
    }
}
