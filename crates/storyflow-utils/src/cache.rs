//! Time-boxed result cache
//!
//! Maps a request [`Fingerprint`] to the last accepted [`Artifact`]. Entries
//! expire lazily: an expired entry is dropped the first time `get` sees it, and
//! `purge_expired` sweeps the rest. When full, the least recently read entry
//! is evicted. Time comes from `tokio::time::Instant` so
//! tests can drive expiry with a paused clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::types::Artifact;

/// Default upper bound on live entries
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Statistics for cache performance tracking
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub writes: usize,
    pub evictions: usize,
}

impl CacheStats {
    /// Calculate cache hit ratio
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One live cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub artifact: Arc<Artifact>,
    pub inserted_at: Instant,
    /// Last write or cache hit
    pub last_used: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Fingerprint, CacheEntry>,
    stats: CacheStats,
}

/// Concurrent fingerprint → artifact cache with per-entry TTL.
///
/// Shared between orchestrators behind an `Arc`. At most one entry exists per
/// fingerprint; `put` is last-writer-wins and restarts the TTL.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResultCache {
    /// Create a cache holding at most `max_entries` live entries (minimum 1).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live artifact. Never returns an expired entry.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Artifact>> {
        let now = Instant::now();
        let mut inner = self.lock();

        let lookup = inner.entries.get_mut(fingerprint).map(|entry| {
            (!entry.is_expired(now)).then(|| {
                entry.last_used = now;
                Arc::clone(&entry.artifact)
            })
        });

        match lookup {
            None => {
                inner.stats.misses += 1;
                None
            }
            Some(Some(artifact)) => {
                inner.stats.hits += 1;
                Some(artifact)
            }
            Some(None) => {
                inner.entries.remove(fingerprint);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                debug!(fingerprint = fingerprint.short(), "cache entry expired");
                None
            }
        }
    }

    /// Store an artifact, replacing any existing entry and restarting its TTL.
    pub fn put(&self, fingerprint: Fingerprint, artifact: Arc<Artifact>, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(&fingerprint) && inner.entries.len() >= self.max_entries {
            Self::make_room(&mut inner, now);
        }

        debug!(
            fingerprint = fingerprint.short(),
            ttl_secs = ttl.as_secs(),
            "cache write"
        );
        inner.entries.insert(
            fingerprint,
            CacheEntry {
                artifact,
                inserted_at: now,
                last_used: now,
                ttl,
            },
        );
        inner.stats.writes += 1;
    }

    fn make_room(inner: &mut Inner, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        if inner.entries.len() < before {
            inner.stats.expirations += before - inner.entries.len();
            return;
        }

        let least_recent = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(fp, _)| fp.clone());
        if let Some(fp) = least_recent {
            inner.entries.remove(&fp);
            inner.stats.evictions += 1;
        }
    }

    /// Remove the entry for `fingerprint`, returning whether one existed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().entries.remove(fingerprint).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        inner.stats.expirations += removed;
        removed
    }

    /// Number of stored entries, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}
