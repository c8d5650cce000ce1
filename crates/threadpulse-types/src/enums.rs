//! Enumeration types for the command channel.
//!
//! Command codes identify which service an inbound control message is
//! routed to, stream codes acknowledge a stream attach, and channel states
//! describe the connection lifecycle reported by the transport.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Command codes
// ---------------------------------------------------------------------------

/// Command type codes understood by the agent's command dispatcher.
///
/// The numeric codes are part of the control protocol and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum CommandType {
    /// Active thread count query or stream request.
    ActiveThreadCount,
    /// Active thread count response payload.
    ActiveThreadCountResponse,
}

impl CommandType {
    /// Return the protocol code for this command type.
    pub const fn code(self) -> i16 {
        match self {
            Self::ActiveThreadCount => 730,
            Self::ActiveThreadCountResponse => 731,
        }
    }

    /// Look up a command type by its protocol code.
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            730 => Some(Self::ActiveThreadCount),
            731 => Some(Self::ActiveThreadCountResponse),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream codes
// ---------------------------------------------------------------------------

/// Acknowledgment returned to the transport when a stream is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum StreamCode {
    /// The stream was accepted; payloads will follow once it connects.
    Ok,
    /// The service has been closed and no longer accepts streams.
    StateClosed,
}

impl StreamCode {
    /// Whether the attach was accepted.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

// ---------------------------------------------------------------------------
// Channel states
// ---------------------------------------------------------------------------

/// Connection state of an observer channel.
///
/// A channel starts [`Open`](Self::Open), moves to
/// [`Connected`](Self::Connected), and ends in exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ChannelState {
    /// Created by the transport, not yet usable for sending.
    Open,
    /// The remote peer is attached and can receive payloads.
    Connected,
    /// The channel was closed normally.
    Closed,
    /// The channel failed and was torn down.
    IllegalState,
}

impl ChannelState {
    /// Whether this is a terminal state (no further transitions).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::IllegalState)
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Transitions run forward only: `Open -> Connected`, and any
    /// non-terminal state may end in `Closed` or `IllegalState`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Connected)
                | (Self::Open | Self::Connected, Self::Closed | Self::IllegalState)
        )
    }
}

impl core::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Open => "OPEN",
            Self::Connected => "CONNECTED",
            Self::Closed => "CLOSED",
            Self::IllegalState => "ILLEGAL_STATE",
        };
        f.write_str(label)
    }
}
