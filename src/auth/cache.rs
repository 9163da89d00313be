//! In-process cache-aside layer for resolved principals, modeled on the
//! concurrent per-key map idiom used elsewhere in this codebase for
//! provider-scoped mutable state (see `circuit_breaker.rs`).

use super::Principal;
use dashmap::DashMap;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    principal: Principal,
    expires_at: Instant,
}

pub struct KeyCache {
    entries: DashMap<String, Entry>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the cached principal for `hash` if present and not expired.
    /// An expired entry is treated the same as a miss — the caller falls
    /// through to the durable repository and repopulates the cache.
    pub fn get(&self, hash: &str) -> Option<Principal> {
        let entry = self.entries.get(hash)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.principal.clone())
    }

    pub fn put(&self, hash: String, principal: Principal) {
        self.entries.insert(hash, Entry { principal, expires_at: Instant::now() + TTL });
    }

    pub fn invalidate(&self, hash: &str) {
        self.entries.remove(hash);
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}
