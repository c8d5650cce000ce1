//! Observer channel abstraction and the in-process stream channel.
//!
//! An [`ObserverChannel`] is the transport's handle for one attached remote
//! observer. The core only needs three things from it: an identity, a
//! non-blocking `send`, and a place to register a [`StateChangeHandler`]
//! that is told when the connection becomes usable or goes away.
//!
//! [`LocalStreamChannel`] implements that contract in-process. Transports
//! (the WebSocket adapter, tests) create one per connection, feed it
//! transitions with [`LocalStreamChannel::change_state`], and drain the
//! payloads it receives through a [`PayloadSink`].
//!
//! # Transition ordering
//!
//! ```text
//!   Open ──► Connected ──► Closed
//!     │          └───────► IllegalState
//!     └──────────────────► Closed | IllegalState
//! ```
//!
//! Each accepted transition is delivered to every handler exactly once, in
//! order. Out-of-order or repeated transitions are rejected and never
//! reach a handler.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use threadpulse_types::{ChannelId, ChannelState};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{SendError, TransitionError};

/// Handle for one attached remote observer.
pub trait ObserverChannel: Send + Sync {
    /// Stable identity used for subscriber set membership.
    fn id(&self) -> ChannelId;

    /// Current connection state.
    fn state(&self) -> ChannelState;

    /// Deliver one payload. Must not block.
    fn send(&self, payload: &[u8]) -> Result<(), SendError>;

    /// Register a handler for this channel's future state transitions.
    fn add_state_change_handler(&self, handler: Arc<dyn StateChangeHandler>);
}

impl fmt::Debug for dyn ObserverChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverChannel")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Receives connection-state transitions of observer channels.
pub trait StateChangeHandler: Send + Sync {
    /// Called once per accepted transition.
    fn state_changed(
        &self,
        channel: &Arc<dyn ObserverChannel>,
        state: ChannelState,
    ) -> Result<(), TransitionError>;

    /// Called when [`state_changed`](Self::state_changed) fails. The
    /// default logs the failure and carries on.
    fn exception_caught(
        &self,
        channel: &Arc<dyn ObserverChannel>,
        state: ChannelState,
        error: &TransitionError,
    ) {
        warn!(
            channel = %channel.id(),
            %state,
            error = %error,
            "state change handler failed"
        );
    }
}

/// What the transport hands to a stream-attach request: access to the
/// channel the stream runs on.
#[derive(Clone)]
pub struct StreamChannelContext {
    channel: Arc<dyn ObserverChannel>,
}

impl StreamChannelContext {
    /// Wrap a channel.
    pub fn new(channel: Arc<dyn ObserverChannel>) -> Self {
        Self { channel }
    }

    /// The channel this stream runs on.
    pub const fn stream_channel(&self) -> &Arc<dyn ObserverChannel> {
        &self.channel
    }
}

impl fmt::Debug for StreamChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannelContext")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Destination for payloads sent on a [`LocalStreamChannel`].
pub trait PayloadSink: Send + Sync {
    /// Hand off one payload without blocking.
    fn deliver(&self, payload: &[u8]) -> Result<(), SendError>;
}

impl PayloadSink for mpsc::Sender<Vec<u8>> {
    fn deliver(&self, payload: &[u8]) -> Result<(), SendError> {
        self.try_send(payload.to_vec()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// In-process [`ObserverChannel`] driven by its owning transport.
pub struct LocalStreamChannel {
    id: ChannelId,
    state: Mutex<ChannelState>,
    /// Serializes transition dispatch so handlers see transitions in order.
    transition_lock: Mutex<()>,
    handlers: RwLock<Vec<Arc<dyn StateChangeHandler>>>,
    sink: Box<dyn PayloadSink>,
}

impl LocalStreamChannel {
    /// Create a channel in the [`ChannelState::Open`] state that delivers
    /// payloads to `sink`.
    pub fn new<S>(sink: S) -> Arc<Self>
    where
        S: PayloadSink + 'static,
    {
        Arc::new(Self {
            id: ChannelId::new(),
            state: Mutex::new(ChannelState::Open),
            transition_lock: Mutex::new(()),
            handlers: RwLock::new(Vec::new()),
            sink: Box::new(sink),
        })
    }

    /// Create a channel backed by a bounded queue of `capacity` payloads.
    /// Returns the channel and the receiving end of the queue.
    pub fn with_queue(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Move the channel to `next` and notify every registered handler.
    ///
    /// Returns `false` (and notifies nobody) if the transition is not
    /// allowed from the current state.
    pub fn change_state(self: &Arc<Self>, next: ChannelState) -> bool {
        let _ordered = self
            .transition_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let current = *state;
            if !current.can_transition_to(next) {
                debug!(channel = %self.id, from = %current, to = %next, "ignoring invalid transition");
                return false;
            }
            *state = next;
        }

        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let channel: Arc<dyn ObserverChannel> = Arc::clone(self) as Arc<dyn ObserverChannel>;
        for handler in handlers {
            if let Err(error) = handler.state_changed(&channel, next) {
                handler.exception_caught(&channel, next, &error);
            }
        }
        true
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ObserverChannel for LocalStreamChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if self.state() != ChannelState::Connected {
            return Err(SendError::NotConnected);
        }
        self.sink.deliver(payload)
    }

    fn add_state_change_handler(&self, handler: Arc<dyn StateChangeHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}

impl fmt::Debug for LocalStreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStreamChannel")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("handlers", &self.handler_count())
            .finish_non_exhaustive()
    }
}
