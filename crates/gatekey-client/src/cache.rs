//! Expiring, encrypting, single-flight cache of auth service resolutions
//!
//! Entries are keyed by the SHA-256 of the access key ID, hold only sealed
//! responses (see [`crate::encryption`]) or negative 404 results, and are
//! evicted least-recently-used once capacity is reached or dropped once
//! their time-to-live passes.
//!
//! Concurrent lookups of a key with no usable entry share one flight: the
//! first caller resolves upstream and every caller waiting on that flight
//! receives its outcome, errors included. Outcomes other than 200 and 404
//! are handed to the waiters and then forgotten.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use gatekey_core::types::CacheConfig;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::encryption::SealedResponse;
use crate::types::{AuthServiceError, AuthServiceResponse, Result};

type CacheKey = [u8; 32];

/// Outcome of one upstream resolution
#[derive(Debug)]
struct Flight {
    outcome: std::result::Result<SealedResponse, AuthServiceError>,
    resolved_at: Instant,
}

impl Flight {
    fn is_cacheable(&self) -> bool {
        match &self.outcome {
            Ok(_) => true,
            Err(err) => err.is_not_found(),
        }
    }
}

struct Slot {
    flight: Arc<OnceCell<Flight>>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    clock: u64,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing entry or flight
    pub hits: u64,
    /// Lookups that started a new upstream resolution
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries currently held, in-flight ones included
    pub entries: usize,
}

/// The resolution cache
pub struct ResolveCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for ResolveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

fn cache_key(access_key_id: &str) -> CacheKey {
    Sha256::digest(access_key_id.as_bytes()).into()
}

impl ResolveCache {
    /// A cache holding at most `capacity` keys for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Build from configuration, or `None` when caching is disabled
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.capacity, Duration::from_secs(config.ttl_secs)))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached outcome for `access_key_id`, resolving with
    /// `resolve` when there is none
    ///
    /// A cached response that does not decrypt under `access_key_id` is an
    /// internal error, never a silent miss.
    pub async fn get_or_resolve<F, Fut>(&self, access_key_id: &str, resolve: F) -> Result<AuthServiceResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthServiceResponse>>,
    {
        let key = cache_key(access_key_id);
        let flight = self.flight(key);

        let outcome = flight
            .get_or_init(|| async {
                let outcome = resolve().await.and_then(|response| {
                    SealedResponse::seal(access_key_id, &response).map_err(|err| {
                        tracing::error!(error = %err, "failed to seal auth service response");
                        AuthServiceError::internal("failed to cache auth service response")
                    })
                });
                Flight {
                    outcome,
                    resolved_at: Instant::now(),
                }
            })
            .await;

        if !outcome.is_cacheable() {
            self.forget(&key, &flight);
        }

        match &outcome.outcome {
            Ok(sealed) => sealed.open(access_key_id).map_err(|err| {
                tracing::error!(error = %err, "cached auth service response failed to decrypt");
                AuthServiceError::internal("cached auth service response is unreadable")
            }),
            Err(err) => Err(err.clone()),
        }
    }

    /// The flight for `key`, starting a new one when no usable entry exists
    fn flight(&self, key: CacheKey) -> Arc<OnceCell<Flight>> {
        let mut state = self.lock();
        state.clock += 1;
        let now = state.clock;

        if let Some(slot) = state.slots.get_mut(&key) {
            let expired = slot
                .flight
                .get()
                .is_some_and(|flight| flight.resolved_at.elapsed() >= self.ttl);
            if !expired {
                slot.last_used = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Arc::clone(&slot.flight);
            }
            state.slots.remove(&key);
        }

        if state.slots.len() >= self.capacity {
            self.evict_one(&mut state);
        }

        let flight = Arc::new(OnceCell::new());
        state.slots.insert(
            key,
            Slot {
                flight: Arc::clone(&flight),
                last_used: now,
            },
        );
        self.misses.fetch_add(1, Ordering::Relaxed);
        flight
    }

    /// Drop the least recently used resolved slot, preferring expired ones
    ///
    /// Slots still in flight are never chosen; when every slot is in flight
    /// the map briefly grows past capacity.
    fn evict_one(&self, state: &mut CacheState) {
        let resolved: Vec<(&CacheKey, u64, &Flight)> = state
            .slots
            .iter()
            .filter_map(|(key, slot)| slot.flight.get().map(|flight| (key, slot.last_used, flight)))
            .collect();
        let victim = resolved
            .iter()
            .find(|(_, _, flight)| flight.resolved_at.elapsed() >= self.ttl)
            .or_else(|| resolved.iter().min_by_key(|(_, last_used, _)| *last_used))
            .map(|(key, _, _)| **key);

        if let Some(key) = victim {
            state.slots.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove `key` if it still refers to `flight`
    fn forget(&self, key: &CacheKey, flight: &Arc<OnceCell<Flight>>) {
        let mut state = self.lock();
        let same = state
            .slots
            .get(key)
            .is_some_and(|slot| Arc::ptr_eq(&slot.flight, flight));
        if same {
            state.slots.remove(key);
        }
    }

    /// Drop every entry. In-flight resolutions still reach their waiters.
    pub fn clear(&self) {
        self.lock().slots.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.lock().slots.len(),
        }
    }
}
