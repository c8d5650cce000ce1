//! Broadcast scheduling: the timer facility, broadcast tasks, the
//! activation slot, and the per-tick fan-out.
//!
//! ## Rules
//! - A [`BroadcastTask`] is one activation cycle. Its generation number is
//!   never reused; once cancelled it stays cancelled.
//! - The [`ActivationSlot`] holds at most one task. Installing and clearing
//!   are compare-and-set on the generation, so only the exact instance
//!   that was observed can ever be cleared and cancelled.
//! - The [`TimerFacility`] owns the root cancellation token. Every task is
//!   a child of it, so closing the facility stops whatever is running and
//!   refuses anything new.
//! - A tick samples, maps and serializes once, then sends the same bytes
//!   to every member of a subscriber snapshot. Send failures, including a
//!   panicking `send`, are isolated per observer.
//! - A panic anywhere in a tick is caught and logged; the loop keeps
//!   ticking until its task is cancelled.
//!
//! ## Tick loop
//! ```text
//! schedule(task) ──► spawn ──► interval_at(now + period, period)
//!   loop {
//!     ├─ task cancelled ──► exit
//!     └─ tick ──► BroadcastJob::run_tick()
//!                   ├─ sample + map + serialize (once)
//!                   ├─ Ok(None) ──► skip, nobody contacted
//!                   └─ for each subscriber: send(payload), failures logged
//!   }
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use threadpulse_types::ActiveThreadCountResponse;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::CommandSerializer;
use crate::error::{TickError, TransitionError};
use crate::registry::SubscriberSet;
use crate::source::{SnapshotSource, now_millis};

/// Slot value meaning "no active task". Generations start at 1.
const EMPTY: u64 = 0;

/// Sample `source` at the current instant and map it to the response shape.
pub fn sample_response(source: &dyn SnapshotSource) -> ActiveThreadCountResponse {
    let now = now_millis();
    let snapshot = source.active_trace_histogram(now);
    ActiveThreadCountResponse::from_snapshot(&snapshot, now)
}

// ---------------------------------------------------------------------------
// BroadcastTask
// ---------------------------------------------------------------------------

/// One activation cycle of the recurring broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastTask {
    generation: u64,
    token: CancellationToken,
}

impl BroadcastTask {
    /// Unique, never-reused generation number of this task.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop this task. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this task (or its timer facility) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// TimerFacility
// ---------------------------------------------------------------------------

/// Creates and schedules broadcast tasks on a Tokio runtime.
#[derive(Debug)]
pub struct TimerFacility {
    runtime: Handle,
    period: Duration,
    root: CancellationToken,
    next_generation: AtomicU64,
}

impl TimerFacility {
    /// Create a facility that schedules on `runtime` every `period`.
    pub fn new(runtime: Handle, period: Duration) -> Self {
        Self {
            runtime,
            period,
            root: CancellationToken::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// The fixed interval between ticks.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Create a new, unscheduled task with a fresh generation.
    pub fn create_task(&self) -> BroadcastTask {
        BroadcastTask {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token: self.root.child_token(),
        }
    }

    /// Start ticking `task` at the fixed period, first tick one period
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::TimerClosed`] if the facility has been
    /// cancelled.
    pub fn schedule(&self, task: &BroadcastTask, job: Arc<BroadcastJob>) -> Result<(), TransitionError> {
        if self.root.is_cancelled() {
            return Err(TransitionError::TimerClosed {
                generation: task.generation,
            });
        }

        let period = self.period;
        let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
        let token = task.token.clone();
        let generation = task.generation;

        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        match catch_unwind(AssertUnwindSafe(|| job.run_tick())) {
                            Ok(Ok(report)) => debug!(
                                generation,
                                delivered = report.delivered,
                                failed = report.failed,
                                skipped = report.skipped,
                                "broadcast tick completed"
                            ),
                            Ok(Err(e)) => warn!(generation, error = %e, "failed to execute broadcast tick"),
                            Err(payload) => warn!(
                                generation,
                                panic = %panic_message(payload.as_ref()),
                                "broadcast tick panicked"
                            ),
                        }
                    }
                }
            }
            debug!(generation, "broadcast task stopped");
        });
        Ok(())
    }

    /// Cancel the facility and every task created from it. Idempotent.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// ActivationSlot
// ---------------------------------------------------------------------------

/// Holds the currently active broadcast task, if any.
///
/// The generation cell is the compare-and-set point; the task handle is
/// stored beside it. All writers run under the lifecycle coordination
/// lock, so the handle always matches the generation once a writer
/// returns.
#[derive(Debug, Default)]
pub struct ActivationSlot {
    active: AtomicU64,
    task: Mutex<Option<BroadcastTask>>,
}

impl ActivationSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `task` if the slot is empty.
    ///
    /// Returns the task back as `Err` if another task already holds the
    /// slot; the caller discards it unscheduled.
    pub fn try_activate(&self, task: BroadcastTask) -> Result<(), BroadcastTask> {
        match self
            .active
            .compare_exchange(EMPTY, task.generation, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
                Ok(())
            }
            Err(_) => Err(task),
        }
    }

    /// Generation of the active task, if any.
    pub fn current(&self) -> Option<u64> {
        match self.active.load(Ordering::Acquire) {
            EMPTY => None,
            generation => Some(generation),
        }
    }

    /// Clear the slot if it still holds `expected`, returning that task.
    ///
    /// Returns `None` if a different task (or none) is installed; a newer
    /// task is never returned.
    pub fn deactivate(&self, expected: u64) -> Option<BroadcastTask> {
        if expected == EMPTY {
            return None;
        }
        self.active
            .compare_exchange(expected, EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let mut guard = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(task) if task.generation == expected => Some(task),
            other => {
                *guard = other;
                None
            }
        }
    }

    /// Whether a task is installed.
    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }
}

// ---------------------------------------------------------------------------
// BroadcastJob
// ---------------------------------------------------------------------------

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Observers the payload was handed to.
    pub delivered: usize,
    /// Observers whose `send` failed or panicked.
    pub failed: usize,
    /// Whether the serializer produced nothing and the tick was skipped.
    pub skipped: bool,
}

/// The work done on every tick, shared by all activation cycles.
pub struct BroadcastJob {
    source: Arc<dyn SnapshotSource>,
    serializer: Arc<dyn CommandSerializer>,
    subscribers: Arc<SubscriberSet>,
}

impl BroadcastJob {
    /// Create a job that samples `source`, encodes with `serializer` and
    /// sends to the members of `subscribers`.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        serializer: Arc<dyn CommandSerializer>,
        subscribers: Arc<SubscriberSet>,
    ) -> Self {
        Self {
            source,
            serializer,
            subscribers,
        }
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if the payload cannot be produced; no observer
    /// is contacted in that case.
    pub fn run_tick(&self) -> Result<TickReport, TickError> {
        let response = sample_response(self.source.as_ref());
        let Some(payload) = self.serializer.serialize(&response)? else {
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        };

        let mut report = TickReport::default();
        for channel in self.subscribers.snapshot().iter() {
            match catch_unwind(AssertUnwindSafe(|| channel.send(&payload))) {
                Ok(Ok(())) => report.delivered = report.delivered.saturating_add(1),
                Ok(Err(e)) => {
                    report.failed = report.failed.saturating_add(1);
                    debug!(channel = %channel.id(), error = %e, "failed to send broadcast payload");
                }
                Err(panic) => {
                    report.failed = report.failed.saturating_add(1);
                    warn!(
                        channel = %channel.id(),
                        panic = %panic_message(panic.as_ref()),
                        "observer send panicked"
                    );
                }
            }
        }
        Ok(report)
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl std::fmt::Debug for BroadcastJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastJob")
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use threadpulse_types::{ActivitySnapshot, ChannelId, ChannelState, HistogramSchema};

    use crate::channel::{LocalStreamChannel, ObserverChannel, StateChangeHandler};
    use crate::codec::JsonCommandSerializer;
    use crate::error::CodecError;

    struct FixedSource;

    impl SnapshotSource for FixedSource {
        fn active_trace_histogram(&self, timestamp_millis: i64) -> ActivitySnapshot {
            ActivitySnapshot::new(HistogramSchema::NORMAL, vec![1, 2, 3, 4], timestamp_millis)
        }
    }

    struct NothingToSend;

    impl CommandSerializer for NothingToSend {
        fn serialize(
            &self,
            _response: &ActiveThreadCountResponse,
        ) -> Result<Option<Vec<u8>>, CodecError> {
            Ok(None)
        }
    }

    struct ExplodingChannel(ChannelId);

    impl ObserverChannel for ExplodingChannel {
        fn id(&self) -> ChannelId {
            self.0
        }

        fn state(&self) -> ChannelState {
            ChannelState::Connected
        }

        fn send(&self, _payload: &[u8]) -> Result<(), crate::error::SendError> {
            panic!("transport exploded");
        }

        fn add_state_change_handler(&self, _handler: Arc<dyn StateChangeHandler>) {}
    }

    fn job_with(serializer: Arc<dyn CommandSerializer>, subscribers: Arc<SubscriberSet>) -> BroadcastJob {
        BroadcastJob::new(Arc::new(FixedSource), serializer, subscribers)
    }

    #[tokio::test]
    async fn slot_admits_exactly_one_task() {
        let facility = TimerFacility::new(Handle::current(), Duration::from_secs(1));
        let slot = ActivationSlot::new();

        let first = facility.create_task();
        let second = facility.create_task();
        assert_ne!(first.generation(), second.generation());

        assert!(slot.try_activate(first.clone()).is_ok());
        let rejected = slot.try_activate(second.clone()).unwrap_err();
        assert_eq!(rejected.generation(), second.generation());
        assert_eq!(slot.current(), Some(first.generation()));
    }

    #[tokio::test]
    async fn stale_deactivate_never_clears_a_newer_task() {
        let facility = TimerFacility::new(Handle::current(), Duration::from_secs(1));
        let slot = ActivationSlot::new();

        let old = facility.create_task();
        slot.try_activate(old.clone()).unwrap();
        let taken = slot.deactivate(old.generation()).unwrap();
        assert_eq!(taken.generation(), old.generation());

        let newer = facility.create_task();
        slot.try_activate(newer.clone()).unwrap();

        assert!(slot.deactivate(old.generation()).is_none());
        assert_eq!(slot.current(), Some(newer.generation()));
        assert!(slot.deactivate(0).is_none());
    }

    #[tokio::test]
    async fn cancelling_the_facility_cancels_its_tasks() {
        let facility = TimerFacility::new(Handle::current(), Duration::from_secs(1));
        let task = facility.create_task();
        assert!(!task.is_cancelled());

        facility.cancel();
        facility.cancel();
        assert!(task.is_cancelled());
        assert!(facility.is_cancelled());

        let job = Arc::new(job_with(Arc::new(JsonCommandSerializer), Arc::new(SubscriberSet::new())));
        let err = facility.schedule(&facility.create_task(), job).unwrap_err();
        assert!(matches!(err, TransitionError::TimerClosed { .. }));
    }

    #[test]
    fn tick_sends_identical_payload_to_every_subscriber() {
        let subscribers = Arc::new(SubscriberSet::new());
        let (a, mut rx_a) = LocalStreamChannel::with_queue(4);
        let (b, mut rx_b) = LocalStreamChannel::with_queue(4);
        a.change_state(ChannelState::Connected);
        b.change_state(ChannelState::Connected);
        subscribers.add(a);
        subscribers.add(b);

        let job = job_with(Arc::new(JsonCommandSerializer), Arc::clone(&subscribers));
        let report = job.run_tick().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);

        let pa = rx_a.try_recv().unwrap();
        let pb = rx_b.try_recv().unwrap();
        assert_eq!(pa, pb);
        let decoded: ActiveThreadCountResponse = serde_json::from_slice(&pa).unwrap();
        assert_eq!(decoded.active_thread_count, vec![1, 2, 3, 4]);
    }

    #[test]
    fn failed_send_is_isolated() {
        let subscribers = Arc::new(SubscriberSet::new());
        let (dead, dead_rx) = LocalStreamChannel::with_queue(4);
        let (live, mut live_rx) = LocalStreamChannel::with_queue(4);
        dead.change_state(ChannelState::Connected);
        live.change_state(ChannelState::Connected);
        drop(dead_rx);
        subscribers.add(dead);
        subscribers.add(live);

        let job = job_with(Arc::new(JsonCommandSerializer), Arc::clone(&subscribers));
        let report = job.run_tick().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn panicking_send_is_isolated() {
        let subscribers = Arc::new(SubscriberSet::new());
        let (live, mut live_rx) = LocalStreamChannel::with_queue(4);
        live.change_state(ChannelState::Connected);
        subscribers.add(Arc::new(ExplodingChannel(ChannelId::new())));
        subscribers.add(live);

        let job = job_with(Arc::new(JsonCommandSerializer), Arc::clone(&subscribers));
        let report = job.run_tick().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn panic_messages_are_extracted() {
        let static_msg = catch_unwind::<_, ()>(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(static_msg.as_ref()), "static");
        let generation = 7;
        let formatted = catch_unwind::<_, ()>(|| panic!("gen {generation}")).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "gen 7");
    }

    #[test]
    fn empty_payload_skips_the_tick() {
        let subscribers = Arc::new(SubscriberSet::new());
        let (a, mut rx) = LocalStreamChannel::with_queue(4);
        a.change_state(ChannelState::Connected);
        subscribers.add(a);

        let job = job_with(Arc::new(NothingToSend), subscribers);
        let report = job.run_tick().unwrap();
        assert!(report.skipped);
        assert_eq!(report.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sample_response_uses_the_sampling_instant() {
        let before = now_millis();
        let response = sample_response(&FixedSource);
        let after = now_millis();
        assert!(response.time_stamp >= before && response.time_stamp <= after);
        assert_eq!(response.histogram_schema_type, 1);
    }
}
