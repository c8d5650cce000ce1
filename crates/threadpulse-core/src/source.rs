//! Snapshot source trait and the in-memory active trace repository.
//!
//! The service never computes activity itself. It asks a
//! [`SnapshotSource`] for a histogram at a given instant, either once per
//! synchronous query or once per broadcast tick. [`ActiveTraceRepository`]
//! is the source used by the agent: instrumentation registers each trace
//! when it starts and removes it when it ends, and a sample buckets the
//! traces still in flight by how long they have been running.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use threadpulse_types::{ActivitySnapshot, BUCKET_COUNT, HistogramSchema, TraceId};

/// A source of activity snapshots.
///
/// Implementations must be side-effect free from the caller's point of
/// view and must always return a snapshot.
pub trait SnapshotSource: Send + Sync {
    /// Return the activity histogram as of `timestamp_millis`
    /// (epoch milliseconds).
    fn active_trace_histogram(&self, timestamp_millis: i64) -> ActivitySnapshot;
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Thread-safe registry of in-flight traces.
#[derive(Debug)]
pub struct ActiveTraceRepository {
    schema: HistogramSchema,
    traces: RwLock<HashMap<TraceId, i64>>,
}

impl ActiveTraceRepository {
    /// Create an empty repository bucketing with `schema`.
    pub fn new(schema: HistogramSchema) -> Self {
        Self {
            schema,
            traces: RwLock::new(HashMap::new()),
        }
    }

    /// The schema used for bucketing.
    pub const fn schema(&self) -> HistogramSchema {
        self.schema
    }

    /// Register a trace that started at `start_millis`. Re-registering an
    /// existing ID replaces its start time.
    pub fn put(&self, trace_id: TraceId, start_millis: i64) {
        self.traces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(trace_id, start_millis);
    }

    /// Register a new trace starting now and return its ID.
    pub fn begin(&self) -> TraceId {
        let id = TraceId::new();
        self.put(id, now_millis());
        id
    }

    /// Remove a finished trace. Returns `true` if it was registered.
    pub fn remove(&self, trace_id: TraceId) -> bool {
        self.traces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&trace_id)
            .is_some()
    }

    /// Number of traces currently in flight.
    pub fn len(&self) -> usize {
        self.traces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no trace is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActiveTraceRepository {
    fn default() -> Self {
        Self::new(HistogramSchema::NORMAL)
    }
}

impl SnapshotSource for ActiveTraceRepository {
    fn active_trace_histogram(&self, timestamp_millis: i64) -> ActivitySnapshot {
        let mut counts = [0_i32; BUCKET_COUNT];
        {
            let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
            for &start in traces.values() {
                let elapsed = timestamp_millis.saturating_sub(start);
                if let Some(slot) = counts.get_mut(self.schema.bucket_index(elapsed)) {
                    *slot = slot.saturating_add(1);
                }
            }
        }
        ActivitySnapshot::new(self.schema, counts.to_vec(), timestamp_millis)
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn empty_repository_yields_zero_buckets() {
        let repo = ActiveTraceRepository::default();
        let snap = repo.active_trace_histogram(10_000);
        assert_eq!(snap.bucket_counts(), &[0, 0, 0, 0]);
        assert_eq!(snap.timestamp(), 10_000);
        assert_eq!(snap.schema().type_code, HistogramSchema::NORMAL.type_code);
    }

    #[test]
    fn traces_are_bucketed_by_elapsed_time() {
        let repo = ActiveTraceRepository::new(HistogramSchema::NORMAL);
        let now = 100_000;
        repo.put(TraceId::new(), now - 10); // fast
        repo.put(TraceId::new(), now - 999); // fast
        repo.put(TraceId::new(), now - 1_500); // normal
        repo.put(TraceId::new(), now - 4_000); // slow
        repo.put(TraceId::new(), now - 9_000); // very slow
        repo.put(TraceId::new(), now + 50); // started after the sample: fast

        let snap = repo.active_trace_histogram(now);
        assert_eq!(snap.bucket_counts(), &[3, 1, 1, 1]);
        assert_eq!(snap.total(), 6);
    }

    #[test]
    fn fast_schema_uses_tighter_boundaries() {
        let repo = ActiveTraceRepository::new(HistogramSchema::FAST);
        repo.put(TraceId::new(), 0);
        let snap = repo.active_trace_histogram(400);
        assert_eq!(snap.bucket_counts(), &[0, 0, 1, 0]);
        assert_eq!(snap.schema().type_code, 2);
    }

    #[test]
    fn removed_traces_are_not_counted() {
        let repo = ActiveTraceRepository::default();
        let a = repo.begin();
        let b = repo.begin();
        assert_eq!(repo.len(), 2);

        assert!(repo.remove(a));
        assert!(!repo.remove(a));
        assert_eq!(repo.len(), 1);

        let snap = repo.active_trace_histogram(now_millis());
        assert_eq!(snap.total(), 1);

        assert!(repo.remove(b));
        assert!(repo.is_empty());
    }

    #[test]
    fn sampling_does_not_mutate_the_repository() {
        let repo = ActiveTraceRepository::default();
        repo.put(TraceId::new(), 0);
        let first = repo.active_trace_histogram(2_000);
        let second = repo.active_trace_histogram(2_000);
        assert_eq!(first, second);
        assert_eq!(repo.len(), 1);
    }
}
