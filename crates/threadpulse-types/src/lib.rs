//! Shared type definitions for threadpulse.
//!
//! This crate is the single source of truth for the values that cross the
//! command channel: the sampled activity histogram, the query/response
//! shapes, and the identifiers and states of attached observer channels.
//! Response types flow downstream to `TypeScript` via `ts-rs` for the
//! monitoring dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for observer channel identity
//! - [`enums`] -- Command codes, stream codes and channel states
//! - [`histogram`] -- Histogram schemas and the immutable [`ActivitySnapshot`]
//! - [`command`] -- Request/response shapes for the active thread count command

pub mod command;
pub mod enums;
pub mod histogram;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use command::{ActiveThreadCountRequest, ActiveThreadCountResponse};
pub use enums::{ChannelState, CommandType, StreamCode};
pub use histogram::{ActivitySnapshot, BUCKET_COUNT, HistogramSchema};
pub use ids::{ChannelId, TraceId};
