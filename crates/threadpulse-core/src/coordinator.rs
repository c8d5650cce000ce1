//! # Lifecycle coordinator: turns channel transitions into broadcast
//! activation and deactivation.
//!
//! One coordinator is built per service and registered as the state-change
//! handler of every attached stream. All transitions, for all channels, are
//! handled under one coordination lock. Broadcast ticks never take it.
//!
//! ```text
//! Connected    ─► subscribers.add(ch)
//!                 new task ─► slot.try_activate
//!                               ├─ won  ─► timer.schedule (first tick after one period)
//!                               └─ lost ─► discard, unscheduled
//!
//! Closed /     ─► subscribers.remove(ch) == Some(0)?
//! IllegalState       └─ yes ─► g = slot.current()
//!                               └─ slot.deactivate(g) ─► cancel that exact task
//! ```
//!
//! Failures are returned to the channel, which hands them to
//! [`StateChangeHandler::exception_caught`] for logging. Work already done
//! for the transition is kept; nothing is rolled back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use threadpulse_types::ChannelState;
use tracing::{debug, info, warn};

use crate::broadcast::{ActivationSlot, BroadcastJob, TimerFacility};
use crate::channel::{ObserverChannel, StateChangeHandler};
use crate::error::TransitionError;
use crate::registry::SubscriberSet;

/// Reacts to observer channel transitions. See the module docs.
#[derive(Debug)]
pub struct LifecycleCoordinator {
    lock: Mutex<()>,
    subscribers: Arc<SubscriberSet>,
    slot: Arc<ActivationSlot>,
    timer: Arc<TimerFacility>,
    job: Arc<BroadcastJob>,
    activations: AtomicU64,
    deactivations: AtomicU64,
}

impl LifecycleCoordinator {
    /// Create a coordinator over the given shared state.
    pub fn new(
        subscribers: Arc<SubscriberSet>,
        slot: Arc<ActivationSlot>,
        timer: Arc<TimerFacility>,
        job: Arc<BroadcastJob>,
    ) -> Self {
        Self {
            lock: Mutex::new(()),
            subscribers,
            slot,
            timer,
            job,
            activations: AtomicU64::new(0),
            deactivations: AtomicU64::new(0),
        }
    }

    /// Number of broadcast tasks started since construction.
    pub fn activation_count(&self) -> u64 {
        self.activations.load(Ordering::Acquire)
    }

    /// Number of broadcast tasks stopped by a last disconnect.
    pub fn deactivation_count(&self) -> u64 {
        self.deactivations.load(Ordering::Acquire)
    }

    fn on_connected(&self, channel: &Arc<dyn ObserverChannel>) -> Result<(), TransitionError> {
        if !self.subscribers.add(Arc::clone(channel)) {
            debug!(channel = %channel.id(), "channel already subscribed");
        }

        let task = self.timer.create_task();
        match self.slot.try_activate(task.clone()) {
            Ok(()) => {
                self.timer.schedule(&task, Arc::clone(&self.job))?;
                self.activations.fetch_add(1, Ordering::AcqRel);
                info!(
                    generation = task.generation(),
                    period_ms = u64::try_from(self.timer.period().as_millis()).unwrap_or(u64::MAX),
                    "turn on broadcast task"
                );
            }
            Err(discarded) => {
                debug!(
                    generation = discarded.generation(),
                    "broadcast task already active; discarding new task"
                );
            }
        }
        Ok(())
    }

    fn on_disconnected(&self, channel: &Arc<dyn ObserverChannel>) {
        let Some(remaining) = self.subscribers.remove(channel.id()) else {
            debug!(channel = %channel.id(), "channel was not subscribed");
            return;
        };
        if remaining > 0 {
            return;
        }

        if let Some(generation) = self.slot.current() {
            if let Some(task) = self.slot.deactivate(generation) {
                task.cancel();
                self.deactivations.fetch_add(1, Ordering::AcqRel);
                info!(generation, "turn off broadcast task");
            } else {
                warn!(generation, "broadcast task changed during deactivation; leaving it running");
            }
        }
    }
}

impl StateChangeHandler for LifecycleCoordinator {
    fn state_changed(
        &self,
        channel: &Arc<dyn ObserverChannel>,
        state: ChannelState,
    ) -> Result<(), TransitionError> {
        info!(channel = %channel.id(), %state, "stream channel state changed");
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match state {
            ChannelState::Connected => self.on_connected(channel),
            ChannelState::Closed | ChannelState::IllegalState => {
                self.on_disconnected(channel);
                Ok(())
            }
            ChannelState::Open => Ok(()),
        }
    }
}
