//! Request and response shapes for the active thread count command.
//!
//! The same [`ActiveThreadCountResponse`] is returned by the synchronous
//! query and pushed, serialized, to every attached stream on each tick.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::histogram::ActivitySnapshot;

/// Inbound active thread count command. Carries no fields; only its
/// presence matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActiveThreadCountRequest;

/// Active thread count response, as queried or broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ActiveThreadCountResponse {
    /// Type code of the histogram schema the counts were bucketed with.
    pub histogram_schema_type: i32,
    /// Active trace counts per bucket: fast, normal, slow, very slow.
    pub active_thread_count: Vec<i32>,
    /// Sample instant in epoch milliseconds.
    #[ts(type = "number")]
    pub time_stamp: i64,
}

impl ActiveThreadCountResponse {
    /// Map a sampled snapshot to the response shape.
    ///
    /// `time_stamp` is the instant the snapshot was requested for; the
    /// bucket list is copied in schema order.
    pub fn from_snapshot(snapshot: &ActivitySnapshot, time_stamp: i64) -> Self {
        Self {
            histogram_schema_type: snapshot.schema().type_code,
            active_thread_count: snapshot.bucket_counts().to_vec(),
            time_stamp,
        }
    }

    /// Total number of active threads across all buckets.
    pub fn total(&self) -> i64 {
        self.active_thread_count.iter().map(|&c| i64::from(c)).sum()
    }
}
