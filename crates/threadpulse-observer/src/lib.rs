//! Observer API server for the threadpulse active thread count feed.
//!
//! This crate puts an Axum HTTP server in front of an
//! [`ActiveThreadCountService`](threadpulse_core::ActiveThreadCountService):
//!
//! - **`WebSocket` endpoint** (`/ws/active-thread-count`): each connection
//!   becomes an observer channel attached to the service's stream, and
//!   receives every broadcast payload as a text frame
//! - **REST endpoint** (`/api/active-thread-count`) for a one-off sample
//! - **Health endpoint** (`/health`) reporting subscriber count and
//!   whether the broadcast task is running
//!
//! # Architecture
//!
//! The service owns the broadcast timer; the observer only bridges
//! sockets to channels. A socket's lifecycle drives its channel's state
//! (`Connected` after upgrade, `Closed` on client close, `IllegalState` on
//! a transport error), and the service starts or stops the broadcast in
//! response.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
