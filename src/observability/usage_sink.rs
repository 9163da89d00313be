//! Bounded ring buffer of completed requests' token usage, the in-memory
//! half of usage recording. A background task drains it into the durable
//! store; if that task falls behind, the sink drops the oldest record
//! rather than blocking request handling — usage accounting degrades
//! before the gateway does.

use crate::models::openai::Usage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub request_id: String,
    pub tenant: String,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    pub latency_ms: u64,
    pub attempts: u32,
    pub success: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct UsageSink {
    capacity: usize,
    buffer: Mutex<VecDeque<UsageRecord>>,
    dropped_total: AtomicU64,
}

impl UsageSink {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, buffer: Mutex::new(VecDeque::with_capacity(capacity)), dropped_total: AtomicU64::new(0) }
    }

    pub fn record(&self, record: UsageRecord) {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(record);
    }

    /// Remove and return up to `max` of the oldest records, for the
    /// background drain task to hand to the durable store.
    pub fn drain(&self, max: usize) -> Vec<UsageRecord> {
        let mut buffer = self.buffer.lock().unwrap();
        let take = max.min(buffer.len());
        buffer.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> UsageRecord {
        UsageRecord {
            request_id: id.to_string(),
            tenant: "tenant-a".to_string(),
            provider: "mock-a".to_string(),
            model: "test-model".to_string(),
            usage: Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
            latency_ms: 10,
            attempts: 1,
            success: true,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_record_and_drain() {
        let sink = UsageSink::new(10);
        sink.record(record("r1"));
        sink.record(record("r2"));
        let drained = sink.drain(10);
        assert_eq!(drained.len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_saturation_drops_oldest() {
        let sink = UsageSink::new(1);
        sink.record(record("r1"));
        sink.record(record("r2"));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.dropped_total(), 1);
        assert_eq!(sink.drain(10)[0].request_id, "r2");
    }

    #[test]
    fn test_drain_caps_at_max() {
        let sink = UsageSink::new(10);
        sink.record(record("r1"));
        sink.record(record("r2"));
        sink.record(record("r3"));
        assert_eq!(sink.drain(2).len(), 2);
        assert_eq!(sink.len(), 1);
    }
}
