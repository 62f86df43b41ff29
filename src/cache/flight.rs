use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::cache::CacheKey;

type Slot = Arc<AsyncMutex<()>>;

/// Per-key gate so that concurrent misses on one page fetch it once.
///
/// The first caller through [`acquire`](Self::acquire) fetches; later callers
/// for the same key wait for its guard to drop and then find the page in the
/// cache it filled.
#[derive(Default)]
pub struct SingleFlight {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

pub struct FlightGuard<'a> {
    flights: &'a SingleFlight,
    key: CacheKey,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, key: &CacheKey) -> FlightGuard<'_> {
        let slot = self.slots().entry(key.clone()).or_default().clone();
        let guard = slot.clone().lock_owned().await;

        FlightGuard {
            flights: self,
            key: key.clone(),
            slot,
            guard: Some(guard),
        }
    }

    /// Keys with a fetch in progress or waiters queued.
    pub fn in_flight(&self) -> usize {
        self.slots().len()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        // One reference is the map's, one is ours; anything more is a waiter.
        let mut slots = self.flights.slots();
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}
