//! Stream lifecycle and broadcast coordination for the active thread count
//! channel.
//!
//! This crate turns a polling measurement ("how many traces are in flight,
//! and for how long") into a continuous feed for any number of attached
//! observers, while answering one-off queries synchronously.
//!
//! # Architecture
//!
//! ```text
//!   transport ──attach_stream──► ActiveThreadCountService
//!       │                              │ registers
//!       │ Connected / Closed           ▼
//!       └──────────────────────► LifecycleCoordinator ──(one lock)
//!                                  │              │
//!                         add/remove│              │CAS install / clear
//!                                  ▼              ▼
//!                           SubscriberSet    ActivationSlot
//!                          (copy-on-write)         │
//!                                  ▲               ▼
//!                                  │ snapshot  TimerFacility ──► BroadcastTask
//!                                  └──────────── BroadcastJob::run_tick (every period)
//!                                                  sample ─► map ─► serialize ─► send to all
//! ```
//!
//! # Modules
//!
//! - [`broadcast`] -- Timer facility, broadcast tasks, activation slot, tick fan-out.
//! - [`channel`] -- [`ObserverChannel`] and [`StateChangeHandler`] traits plus
//!   the in-process [`LocalStreamChannel`].
//! - [`codec`] -- Response serialization.
//! - [`config`] -- YAML configuration with environment overrides.
//! - [`coordinator`] -- The transition state machine.
//! - [`error`] -- Error types.
//! - [`registry`] -- Copy-on-write [`SubscriberSet`].
//! - [`service`] -- The command facade, [`ActiveThreadCountService`].
//! - [`source`] -- [`SnapshotSource`] and the [`ActiveTraceRepository`].
//!
//! [`ObserverChannel`]: channel::ObserverChannel
//! [`StateChangeHandler`]: channel::StateChangeHandler
//! [`LocalStreamChannel`]: channel::LocalStreamChannel
//! [`SubscriberSet`]: registry::SubscriberSet
//! [`ActiveThreadCountService`]: service::ActiveThreadCountService
//! [`SnapshotSource`]: source::SnapshotSource
//! [`ActiveTraceRepository`]: source::ActiveTraceRepository

pub mod broadcast;
pub mod channel;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod service;
pub mod source;

// Re-export primary types for convenience.
pub use channel::{LocalStreamChannel, ObserverChannel, StateChangeHandler, StreamChannelContext};
pub use codec::{CommandSerializer, JsonCommandSerializer};
pub use config::{ConfigError, PulseConfig};
pub use error::{CodecError, SendError, ServiceError, TickError, TransitionError};
pub use service::ActiveThreadCountService;
pub use source::{ActiveTraceRepository, SnapshotSource};
