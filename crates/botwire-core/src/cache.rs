//! Dedup and member-name caches.
//!
//! Both caches are owned by a session instance rather than shared process
//! state, so names and message ids never leak across accounts when many
//! sessions run in one process.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default dedup clear threshold.
pub const DEFAULT_DEDUP_THRESHOLD: usize = 1000;
/// Default dedup sweep interval (1 hour).
pub const DEFAULT_DEDUP_SWEEP_MS: u64 = 3_600_000;
/// Member display-name time-to-live (1 hour).
pub const MEMBER_NAME_TTL: Duration = Duration::from_secs(3600);

/// Dedup cache policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupConfig {
    /// Clear everything once the number of seen ids exceeds this.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// How often the sweep runs, in milliseconds.
    #[serde(default = "default_sweep_ms")]
    pub sweep_interval_ms: u64,
}

fn default_threshold() -> usize {
    DEFAULT_DEDUP_THRESHOLD
}
fn default_sweep_ms() -> u64 {
    DEFAULT_DEDUP_SWEEP_MS
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DEDUP_THRESHOLD,
            sweep_interval_ms: DEFAULT_DEDUP_SWEEP_MS,
        }
    }
}

/// Bounded set of recently seen message ids.
///
/// There is no per-entry expiry: a periodic sweep clears the whole set
/// once it exceeds the threshold. Approximate by design — an old id could
/// in principle be missed after a clear, in exchange for O(1) bookkeeping.
#[derive(Debug, Default)]
pub struct DedupCache {
    seen: Mutex<HashSet<i64>>,
}

impl DedupCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as seen. Returns `true` if it was not seen before.
    pub fn insert(&self, id: i64) -> bool {
        self.seen.lock().insert(id)
    }

    /// Number of recorded ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no ids are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Wholesale clear if over the threshold. Returns `true` if cleared.
    pub fn sweep(&self, threshold: usize) -> bool {
        let mut seen = self.seen.lock();
        if seen.len() > threshold {
            seen.clear();
            true
        } else {
            false
        }
    }
}

/// Display-name cache keyed by `(group_id, user_id)` with a fixed TTL,
/// plus a marker set of groups whose full roster was already fetched.
#[derive(Debug, Default)]
pub struct MemberNameCache {
    names: DashMap<(i64, i64), (String, Instant)>,
    bulk_fetched: DashSet<i64>,
}

impl MemberNameCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a display name; expired entries are treated as misses.
    #[must_use]
    pub fn get(&self, group_id: i64, user_id: i64) -> Option<String> {
        let entry = self.names.get(&(group_id, user_id))?;
        let (name, stored_at) = entry.value();
        if stored_at.elapsed() < MEMBER_NAME_TTL {
            Some(name.clone())
        } else {
            None
        }
    }

    /// Store a display name.
    pub fn insert(&self, group_id: i64, user_id: i64, name: impl Into<String>) {
        let _ = self
            .names
            .insert((group_id, user_id), (name.into(), Instant::now()));
    }

    /// Whether this group's roster was already bulk-fetched.
    #[must_use]
    pub fn is_bulk_fetched(&self, group_id: i64) -> bool {
        self.bulk_fetched.contains(&group_id)
    }

    /// Record that a bulk roster fetch was attempted for this group.
    pub fn mark_bulk_fetched(&self, group_id: i64) {
        let _ = self.bulk_fetched.insert(group_id);
    }

    /// Number of cached names (including expired, until overwritten).
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
