//! In-memory observability fabric: bounded ring buffers for usage records
//! and request traces, drained by background tasks into the durable store
//! and exposed read-only through the admin surface.

pub mod trace_store;
pub mod usage_sink;

pub use trace_store::{TraceEvent, TraceStore};
pub use usage_sink::{UsageRecord, UsageSink};
