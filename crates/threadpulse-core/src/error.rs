//! Error types for the active thread count service.
//!
//! Only [`ServiceError`] ever reaches a caller. The other errors are
//! produced inside transition handling, broadcast ticks and per-observer
//! sends, where they are logged and swallowed so that one failure never
//! stops the feed for anyone else.

/// Errors returned synchronously by the command facade.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The inbound query carried no request.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// The service was constructed outside a Tokio runtime, so it has no
    /// timer facility to schedule broadcasts on.
    #[error("no tokio runtime available for the broadcast timer")]
    NoRuntime,

    /// The configured broadcast interval is not strictly positive.
    #[error("broadcast interval must be greater than zero")]
    InvalidInterval,
}

/// Failure while processing a channel state transition.
///
/// Logged by the handler's `exception_caught` hook; never propagated to
/// the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    /// The timer facility was cancelled by a service close, so a new
    /// broadcast task cannot be scheduled.
    #[error("broadcast timer already cancelled; cannot schedule generation {generation}")]
    TimerClosed {
        /// Generation of the task that could not be scheduled.
        generation: u64,
    },
}

/// Failure while producing the payload for one broadcast tick.
///
/// Aborts the remaining work of that tick only; the task keeps running.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The response could not be serialized.
    #[error("failed to serialize broadcast payload: {source}")]
    Codec {
        /// The underlying codec error.
        #[from]
        source: CodecError,
    },
}

/// Failure to serialize a command response.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding failed.
    #[error("json encoding failed: {source}")]
    Json {
        /// The underlying `serde_json` error.
        #[from]
        source: serde_json::Error,
    },
}

/// Per-observer delivery failure. Isolated to that observer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The channel is not in the connected state.
    #[error("channel is not connected")]
    NotConnected,

    /// The observer's outbound queue is full; the payload was dropped.
    #[error("outbound queue full")]
    Full,

    /// The observer's outbound queue has been closed by the transport.
    #[error("outbound queue closed")]
    Closed,
}
