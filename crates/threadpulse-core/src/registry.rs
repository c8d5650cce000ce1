//! # `SubscriberSet`: copy-on-write set of attached observer channels
//!
//! Writers (transition handling) replace the whole member list under a
//! short write lock; readers (broadcast ticks) clone the current `Arc`
//! and iterate it with no lock held. A slow `send` therefore never stalls
//! a connect or disconnect, and a membership change during a tick never
//! disturbs that tick's iteration.
//!
//! ```text
//!   add/remove ──► [write lock] clone Vec, edit, swap Arc ──► new snapshot
//!   tick       ──► [read lock]  clone Arc ──► iterate old snapshot, no lock
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use threadpulse_types::ChannelId;

use crate::channel::ObserverChannel;

/// Point-in-time view of the subscriber set.
pub type SubscriberSnapshot = Arc<Vec<Arc<dyn ObserverChannel>>>;

/// Set of currently attached observer channels, keyed by [`ChannelId`].
#[derive(Debug, Default)]
pub struct SubscriberSet {
    channels: RwLock<SubscriberSnapshot>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `channel`. Returns `false` if a channel with the same ID is
    /// already a member (the set is left unchanged).
    pub fn add(&self, channel: Arc<dyn ObserverChannel>) -> bool {
        let mut guard = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let id = channel.id();
        if guard.iter().any(|c| c.id() == id) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len().saturating_add(1));
        next.extend(guard.iter().cloned());
        next.push(channel);
        *guard = Arc::new(next);
        true
    }

    /// Remove the channel with `id`.
    ///
    /// Returns `Some(remaining)` with the member count left after the
    /// removal, or `None` if the channel was not a member. Both facts are
    /// taken under the same lock, so `Some(0)` means this call emptied the
    /// set.
    pub fn remove(&self, id: ChannelId) -> Option<usize> {
        let mut guard = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|c| c.id() == id) {
            return None;
        }
        let next: Vec<_> = guard.iter().filter(|c| c.id() != id).cloned().collect();
        let remaining = next.len();
        *guard = Arc::new(next);
        Some(remaining)
    }

    /// Current members. Cheap: clones one `Arc`.
    pub fn snapshot(&self) -> SubscriberSnapshot {
        Arc::clone(&self.channels.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: ChannelId) -> bool {
        self.snapshot().iter().any(|c| c.id() == id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Drop every member.
    pub fn clear(&self) {
        *self.channels.write().unwrap_or_else(PoisonError::into_inner) = Arc::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalStreamChannel;

    fn channel() -> Arc<dyn ObserverChannel> {
        let (ch, _rx) = LocalStreamChannel::with_queue(1);
        ch
    }

    #[test]
    fn add_is_idempotent_per_channel() {
        let set = SubscriberSet::new();
        let a = channel();
        assert!(set.add(Arc::clone(&a)));
        assert!(!set.add(Arc::clone(&a)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(a.id()));
    }

    #[test]
    fn remove_reports_remaining_members() {
        let set = SubscriberSet::new();
        let a = channel();
        let b = channel();
        set.add(Arc::clone(&a));
        set.add(Arc::clone(&b));

        assert_eq!(set.remove(a.id()), Some(1));
        assert_eq!(set.remove(a.id()), None);
        assert_eq!(set.remove(b.id()), Some(0));
        assert!(set.is_empty());
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let set = SubscriberSet::new();
        let a = channel();
        let b = channel();
        set.add(Arc::clone(&a));

        let before = set.snapshot();
        set.add(Arc::clone(&b));
        set.remove(a.id());

        assert_eq!(before.len(), 1);
        assert_eq!(before.first().map(|c| c.id()), Some(a.id()));
        assert_eq!(set.snapshot().first().map(|c| c.id()), Some(b.id()));
    }

    #[test]
    fn clear_empties_the_set() {
        let set = SubscriberSet::new();
        set.add(channel());
        set.add(channel());
        set.clear();
        assert!(set.is_empty());
    }
}
