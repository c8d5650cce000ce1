//! Histogram schemas and activity snapshots.
//!
//! An [`ActivitySnapshot`] is one timestamped measurement of how many traces
//! are currently in flight, bucketed by how long they have been running.
//! The bucket boundaries come from a [`HistogramSchema`].

use serde::{Deserialize, Serialize};

/// Number of buckets in every activity histogram: fast, normal, slow, very slow.
pub const BUCKET_COUNT: usize = 4;

/// Bucket boundaries (in milliseconds) for classifying in-flight traces.
///
/// A trace whose elapsed time is below `fast` lands in the fast bucket,
/// below `normal` in the normal bucket, below `slow` in the slow bucket,
/// and everything else in the very-slow bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistogramSchema {
    /// Protocol code identifying this schema to consumers.
    pub type_code: i32,
    /// Upper bound (exclusive) of the fast bucket.
    pub fast: i64,
    /// Upper bound (exclusive) of the normal bucket.
    pub normal: i64,
    /// Upper bound (exclusive) of the slow bucket.
    pub slow: i64,
}

impl HistogramSchema {
    /// Schema for typical request/response workloads (1s / 3s / 5s).
    pub const NORMAL: Self = Self {
        type_code: 1,
        fast: 1_000,
        normal: 3_000,
        slow: 5_000,
    };

    /// Schema for latency-sensitive workloads (100ms / 300ms / 500ms).
    pub const FAST: Self = Self {
        type_code: 2,
        fast: 100,
        normal: 300,
        slow: 500,
    };

    /// Look up a built-in schema by its configuration name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "normal" => Some(Self::NORMAL),
            "fast" => Some(Self::FAST),
            _ => None,
        }
    }

    /// Return the bucket index (0..[`BUCKET_COUNT`]) for an elapsed time.
    ///
    /// Negative elapsed times (a trace that started after the sample
    /// instant) count as fast.
    pub const fn bucket_index(&self, elapsed_ms: i64) -> usize {
        if elapsed_ms < self.fast {
            0
        } else if elapsed_ms < self.normal {
            1
        } else if elapsed_ms < self.slow {
            2
        } else {
            3
        }
    }
}

impl Default for HistogramSchema {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// One immutable measurement of current activity.
///
/// Produced fresh on every query or broadcast tick and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySnapshot {
    schema: HistogramSchema,
    bucket_counts: Vec<i32>,
    timestamp: i64,
}

impl ActivitySnapshot {
    /// Create a snapshot from its parts.
    pub const fn new(schema: HistogramSchema, bucket_counts: Vec<i32>, timestamp: i64) -> Self {
        Self {
            schema,
            bucket_counts,
            timestamp,
        }
    }

    /// An all-zero snapshot for the given schema.
    pub fn empty(schema: HistogramSchema, timestamp: i64) -> Self {
        Self::new(schema, vec![0; BUCKET_COUNT], timestamp)
    }

    /// The schema the buckets were computed with.
    pub const fn schema(&self) -> &HistogramSchema {
        &self.schema
    }

    /// Bucket counts in schema order: fast, normal, slow, very slow.
    pub fn bucket_counts(&self) -> &[i32] {
        &self.bucket_counts
    }

    /// Sample instant in epoch milliseconds.
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Total number of in-flight traces across all buckets.
    pub fn total(&self) -> i64 {
        self.bucket_counts.iter().map(|&c| i64::from(c)).sum()
    }
}
