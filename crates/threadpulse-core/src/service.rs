//! The active thread count command service.
//!
//! [`ActiveThreadCountService`] is the entry point the command dispatcher
//! talks to. It answers two kinds of requests:
//!
//! - a synchronous [`query`](ActiveThreadCountService::query), sampled once
//!   and returned to the caller, and
//! - a stream [`attach`](ActiveThreadCountService::attach_stream), which
//!   registers the lifecycle coordinator on the stream's channel and
//!   acknowledges immediately. The channel joins the broadcast only when
//!   it later reports `Connected`.
//!
//! Closing the service cancels the broadcast timer and forgets every
//! subscriber. Dropping it closes it.

use std::sync::Arc;
use std::time::Duration;

use threadpulse_types::{
    ActiveThreadCountRequest, ActiveThreadCountResponse, CommandType, StreamCode,
};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::broadcast::{ActivationSlot, BroadcastJob, TimerFacility, sample_response};
use crate::channel::StreamChannelContext;
use crate::codec::{CommandSerializer, JsonCommandSerializer};
use crate::config::StreamConfig;
use crate::coordinator::LifecycleCoordinator;
use crate::error::ServiceError;
use crate::registry::SubscriberSet;
use crate::source::SnapshotSource;

/// Default interval between broadcast ticks.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1_000);

/// Active thread count query and stream service.
pub struct ActiveThreadCountService {
    source: Arc<dyn SnapshotSource>,
    subscribers: Arc<SubscriberSet>,
    slot: Arc<ActivationSlot>,
    timer: Arc<TimerFacility>,
    coordinator: Arc<LifecycleCoordinator>,
}

impl ActiveThreadCountService {
    /// Create a service broadcasting JSON payloads every
    /// [`DEFAULT_FLUSH_INTERVAL`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(source: Arc<dyn SnapshotSource>) -> Result<Self, ServiceError> {
        Self::with_serializer(source, Arc::new(JsonCommandSerializer), DEFAULT_FLUSH_INTERVAL)
    }

    /// Create a service from stream configuration.
    pub fn from_config(
        source: Arc<dyn SnapshotSource>,
        config: &StreamConfig,
    ) -> Result<Self, ServiceError> {
        Self::with_serializer(source, Arc::new(JsonCommandSerializer), config.flush_interval())
    }

    /// Create a service with an explicit serializer and broadcast interval.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInterval`] for a zero interval, or
    /// [`ServiceError::NoRuntime`] when called outside a Tokio runtime.
    pub fn with_serializer(
        source: Arc<dyn SnapshotSource>,
        serializer: Arc<dyn CommandSerializer>,
        flush_interval: Duration,
    ) -> Result<Self, ServiceError> {
        if flush_interval.is_zero() {
            return Err(ServiceError::InvalidInterval);
        }
        let runtime = Handle::try_current().map_err(|_err| ServiceError::NoRuntime)?;

        let subscribers = Arc::new(SubscriberSet::new());
        let slot = Arc::new(ActivationSlot::new());
        let timer = Arc::new(TimerFacility::new(runtime, flush_interval));
        let job = Arc::new(BroadcastJob::new(
            Arc::clone(&source),
            serializer,
            Arc::clone(&subscribers),
        ));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            Arc::clone(&subscribers),
            Arc::clone(&slot),
            Arc::clone(&timer),
            job,
        ));

        Ok(Self {
            source,
            subscribers,
            slot,
            timer,
            coordinator,
        })
    }

    /// The command type this service answers.
    pub const fn command_type(&self) -> CommandType {
        CommandType::ActiveThreadCount
    }

    /// Sample the current activity and return it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if `request` is absent.
    pub fn query(
        &self,
        request: Option<&ActiveThreadCountRequest>,
    ) -> Result<ActiveThreadCountResponse, ServiceError> {
        if request.is_none() {
            return Err(ServiceError::InvalidRequest {
                reason: "active thread count request must be present".to_owned(),
            });
        }
        Ok(sample_response(self.source.as_ref()))
    }

    /// Register for state changes on the context's channel and acknowledge.
    ///
    /// The channel is not subscribed here; it joins when it transitions to
    /// `Connected`. Answers [`StreamCode::StateClosed`] once the service
    /// has been closed.
    pub fn attach_stream(
        &self,
        request: &ActiveThreadCountRequest,
        context: &StreamChannelContext,
    ) -> StreamCode {
        let channel = context.stream_channel();
        if self.timer.is_cancelled() {
            warn!(channel = %channel.id(), "stream rejected: service closed");
            return StreamCode::StateClosed;
        }
        info!(channel = %channel.id(), ?request, "stream command accepted");
        channel.add_state_change_handler(Arc::clone(&self.coordinator) as _);
        StreamCode::Ok
    }

    /// Cancel the broadcast timer and forget all subscribers. Idempotent.
    pub fn close(&self) {
        if !self.timer.is_cancelled() {
            info!(subscribers = self.subscribers.len(), "closing active thread count service");
        }
        self.timer.cancel();
        self.subscribers.clear();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.timer.is_cancelled()
    }

    /// Number of currently subscribed channels.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether a broadcast task is installed and the timer is running.
    pub fn is_broadcasting(&self) -> bool {
        self.slot.is_active() && !self.timer.is_cancelled()
    }

    /// Number of broadcast tasks started since construction.
    pub fn activation_count(&self) -> u64 {
        self.coordinator.activation_count()
    }

    /// Number of broadcast tasks stopped because the last observer left.
    pub fn deactivation_count(&self) -> u64 {
        self.coordinator.deactivation_count()
    }
}

impl std::fmt::Debug for ActiveThreadCountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveThreadCountService")
            .field("subscribers", &self.subscribers.len())
            .field("active_generation", &self.slot.current())
            .field("closed", &self.timer.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for ActiveThreadCountService {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::ActiveTraceRepository;

    #[test]
    fn construction_outside_a_runtime_fails() {
        let result = ActiveThreadCountService::new(Arc::new(ActiveTraceRepository::default()));
        assert!(matches!(result, Err(ServiceError::NoRuntime)));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let result = ActiveThreadCountService::with_serializer(
            Arc::new(ActiveTraceRepository::default()),
            Arc::new(JsonCommandSerializer),
            Duration::ZERO,
        );
        assert!(matches!(result, Err(ServiceError::InvalidInterval)));
    }

    #[tokio::test]
    async fn answers_the_active_thread_count_command() {
        let service = ActiveThreadCountService::new(Arc::new(ActiveTraceRepository::default())).unwrap();
        assert_eq!(service.command_type().code(), 730);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let service = ActiveThreadCountService::new(Arc::new(ActiveTraceRepository::default())).unwrap();
        service.close();
        service.close();
        assert!(service.is_closed());
        assert!(!service.is_broadcasting());
    }
}
