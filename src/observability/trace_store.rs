//! Bounded ring buffer of per-request trace events, readable from the
//! admin surface and durable-written best-effort. Mirrors the usage sink's
//! non-blocking, drop-on-saturation design — tracing must never add
//! backpressure to the request path.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::retry::AttemptEvent;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    RoutingStart { model: String },
    AttemptSkipped { provider: String, reason: String },
    AttemptStart { provider: String, upstream_model: String },
    AttemptEnd { provider: String, success: bool, latency_ms: u64, error_kind: Option<String> },
    RequestEnd { success: bool, latency_ms: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: TraceEventKind,
}

impl TraceEvent {
    pub fn routing_start(request_id: &str, model: &str) -> Self {
        Self { request_id: request_id.to_string(), timestamp: chrono::Utc::now(), event: TraceEventKind::RoutingStart { model: model.to_string() } }
    }

    pub fn request_end(request_id: &str, success: bool, elapsed: Duration) -> Self {
        Self {
            request_id: request_id.to_string(),
            timestamp: chrono::Utc::now(),
            event: TraceEventKind::RequestEnd { success, latency_ms: elapsed.as_millis() as u64 },
        }
    }

    pub fn from_attempt(request_id: &str, attempt: &AttemptEvent) -> Self {
        let event = match attempt {
            AttemptEvent::Skipped { provider, reason } => TraceEventKind::AttemptSkipped { provider: provider.clone(), reason: reason.to_string() },
            AttemptEvent::Started { provider, upstream_model } => TraceEventKind::AttemptStart { provider: provider.clone(), upstream_model: upstream_model.clone() },
            AttemptEvent::Succeeded { provider, latency_ms } => TraceEventKind::AttemptEnd { provider: provider.clone(), success: true, latency_ms: *latency_ms, error_kind: None },
            AttemptEvent::Failed { provider, error_kind, .. } => TraceEventKind::AttemptEnd { provider: provider.clone(), success: false, latency_ms: 0, error_kind: Some(error_kind.to_string()) },
        };
        Self { request_id: request_id.to_string(), timestamp: chrono::Utc::now(), event }
    }
}

/// Fixed-capacity FIFO ring: once full, the oldest event is dropped to
/// make room for the newest, and `dropped_total` is incremented so
/// saturation shows up in `/metrics` rather than silently vanishing.
pub struct TraceStore {
    capacity: usize,
    buffer: Mutex<VecDeque<TraceEvent>>,
    dropped_total: AtomicU64,
}

impl TraceStore {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, buffer: Mutex::new(VecDeque::with_capacity(capacity)), dropped_total: AtomicU64::new(0) }
    }

    pub fn record(&self, event: TraceEvent) {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
    }

    pub fn recent(&self, limit: usize) -> Vec<TraceEvent> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().rev().take(limit).cloned().collect()
    }

    pub fn for_request(&self, request_id: &str) -> Vec<TraceEvent> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().filter(|e| e.request_id == request_id).cloned().collect()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recent() {
        let store = TraceStore::new(10);
        store.record(TraceEvent::routing_start("req-1", "gpt-4"));
        store.record(TraceEvent::routing_start("req-2", "claude-3"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.recent(1).len(), 1);
    }

    #[test]
    fn test_saturation_drops_oldest_and_counts() {
        let store = TraceStore::new(2);
        store.record(TraceEvent::routing_start("req-1", "m"));
        store.record(TraceEvent::routing_start("req-2", "m"));
        store.record(TraceEvent::routing_start("req-3", "m"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.dropped_total(), 1);
        assert!(store.for_request("req-1").is_empty());
    }

    #[test]
    fn test_for_request_filters() {
        let store = TraceStore::new(10);
        store.record(TraceEvent::routing_start("req-1", "m"));
        store.record(TraceEvent::request_end("req-1", true, Duration::from_millis(5)));
        store.record(TraceEvent::routing_start("req-2", "m"));
        assert_eq!(store.for_request("req-1").len(), 2);
    }
}
