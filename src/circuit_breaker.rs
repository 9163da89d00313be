//! Per-provider circuit breakers.
//!
//! One breaker per key (by default the provider name; candidates that name
//! the same provider host share a breaker and a half-open admission slot —
//! see the open-question decision in DESIGN.md). Mutation is confined to the
//! `allow`/`record_success`/`record_failure` trio, matching the spec's
//! "provider-scoped mutable state" design note. Grounded in
//! `load_balancer.rs`'s `HealthState`/`InstanceHealth` for the
//! `DashMap` + per-key-lock idiom, generalized from a binary health flag to
//! the three-state machine below.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
    pub half_open_max_requests: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

#[derive(Debug)]
struct Entry {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_in_flight: usize,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            opened_at: None,
            half_open_in_flight: 0,
        }
    }
}

/// Read-only snapshot used by admin endpoints and trace events.
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub remaining_timeout: Option<Duration>,
}

pub struct CircuitBreakerRegistry {
    entries: DashMap<String, Mutex<Entry>>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Non-mutating check used by the router when building a candidate list
    /// (spec §4.4 step 3): an `open` breaker whose timeout has not yet
    /// elapsed excludes the candidate; everything else (closed, half_open,
    /// or open-but-due-for-probe) stays in the list so the failover loop's
    /// `allow` can make the real admission decision.
    pub fn would_allow(&self, key: &str) -> bool {
        match self.entries.get(key) {
            None => true,
            Some(entry) => {
                let entry = entry.lock().unwrap();
                match entry.state {
                    CircuitState::Closed | CircuitState::HalfOpen => true,
                    CircuitState::Open => self.is_due_for_probe(&entry),
                }
            }
        }
    }

    fn is_due_for_probe(&self, entry: &Entry) -> bool {
        match entry.opened_at {
            Some(opened_at) => Instant::now().duration_since(opened_at) >= self.config.open_timeout,
            None => true,
        }
    }

    /// The single atomic mutator. Returns whether the caller may dispatch an
    /// attempt to this key right now.
    pub fn allow(&self, key: &str) -> bool {
        let entry_ref = self.entries.entry(key.to_string()).or_default();
        let mut entry = entry_ref.lock().unwrap();

        match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.is_due_for_probe(&entry) {
                    entry.state = CircuitState::HalfOpen;
                    entry.half_open_in_flight = 1;
                    tracing::info!(key, "circuit breaker transitioning open -> half_open");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if entry.half_open_in_flight < self.config.half_open_max_requests {
                    entry.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let entry_ref = self.entries.entry(key.to_string()).or_default();
        let mut entry = entry_ref.lock().unwrap();

        match entry.state {
            CircuitState::Closed => {
                entry.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                entry.half_open_in_flight = entry.half_open_in_flight.saturating_sub(1);
                entry.consecutive_successes += 1;
                if entry.consecutive_successes >= self.config.success_threshold {
                    tracing::info!(key, "circuit breaker transitioning half_open -> closed");
                    entry.state = CircuitState::Closed;
                    entry.consecutive_failures = 0;
                    entry.consecutive_successes = 0;
                    entry.opened_at = None;
                }
            }
            CircuitState::Open => {
                // A late success racing a timeout-triggered probe from another
                // caller; nothing to do, the probe's own record_* governs.
            }
        }
    }

    pub fn record_failure(&self, key: &str) {
        let entry_ref = self.entries.entry(key.to_string()).or_default();
        let mut entry = entry_ref.lock().unwrap();
        let now = Instant::now();

        match entry.state {
            CircuitState::Closed => {
                entry.consecutive_failures += 1;
                entry.consecutive_successes = 0;
                entry.last_failure_at = Some(now);
                if entry.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(key, "circuit breaker transitioning closed -> open");
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                entry.half_open_in_flight = entry.half_open_in_flight.saturating_sub(1);
                tracing::warn!(key, "circuit breaker transitioning half_open -> open");
                entry.state = CircuitState::Open;
                entry.consecutive_successes = 0;
                entry.last_failure_at = Some(now);
                entry.opened_at = Some(now);
            }
            CircuitState::Open => {
                entry.last_failure_at = Some(now);
            }
        }
    }

    pub fn snapshot(&self, key: &str) -> CircuitSnapshot {
        match self.entries.get(key) {
            None => CircuitSnapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                remaining_timeout: None,
            },
            Some(entry) => {
                let entry = entry.lock().unwrap();
                let remaining_timeout = entry.opened_at.map(|opened_at| {
                    self.config
                        .open_timeout
                        .saturating_sub(Instant::now().duration_since(opened_at))
                });
                CircuitSnapshot {
                    state: entry.state,
                    consecutive_failures: entry.consecutive_failures,
                    consecutive_successes: entry.consecutive_successes,
                    remaining_timeout,
                }
            }
        }
    }

    /// Smallest remaining open-timeout across all tracked keys; used to
    /// compute `Retry-After` when every candidate is unavailable.
    pub fn earliest_remaining_timeout(&self, keys: &[String]) -> Duration {
        keys.iter()
            .filter_map(|k| self.snapshot(k).remaining_timeout)
            .min()
            .unwrap_or(self.config.open_timeout)
    }
}
