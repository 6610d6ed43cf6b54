//! Status broadcaster
//!
//! Fans operation status out to any number of subscribers without ever
//! blocking the publisher. Each subscriber owns a small bounded queue;
//! when it is full the oldest queued non-terminal status is evicted, so a
//! slow reader loses "in progress" notices before it loses an outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use fingerlink_types::OperationStatus;

/// One subscriber's queue
#[derive(Debug)]
struct Mailbox {
    queue: Mutex<VecDeque<OperationStatus>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, status: OperationStatus, capacity: usize) {
        let mut queue = self.queue.lock();

        if queue.len() >= capacity {
            let evict = queue.iter().position(|queued| !queued.is_terminal()).unwrap_or(0);
            queue.remove(evict);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        queue.push_back(status);
        drop(queue);

        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Arc<Mailbox>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        for mailbox in self.subscribers.get_mut().values() {
            mailbox.close();
        }
    }
}

/// Publish side; cheap to clone
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    shared: Arc<Shared>,
}

impl StatusBroadcaster {
    /// Create a broadcaster whose subscribers queue at most `capacity` statuses
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new(self.shared.capacity));

        self.shared
            .subscribers
            .lock()
            .insert(id, Arc::clone(&mailbox));
        debug!(subscriber = id, "Subscriber attached");

        Subscription {
            id,
            mailbox,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Subscribe with `current` already queued
    pub fn subscribe_with(&self, current: OperationStatus) -> Subscription {
        let subscription = self.subscribe();
        subscription.mailbox.push(current, self.shared.capacity);
        subscription
    }

    /// Detach a subscriber; dropping the subscription does the same
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Queue `status` for every subscriber; never waits
    pub fn publish(&self, status: OperationStatus) {
        let subscribers = self.shared.subscribers.lock();
        trace!(subscribers = subscribers.len(), %status, "Publishing status");

        for mailbox in subscribers.values() {
            mailbox.push(status.clone(), self.shared.capacity);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Receive side of one subscriber
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    mailbox: Arc<Mailbox>,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Wait for the next status
    ///
    /// Returns `None` once the broadcaster is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<OperationStatus> {
        loop {
            if let Some(status) = self.try_recv() {
                return Some(status);
            }

            if self.mailbox.closed.load(Ordering::Acquire) {
                return None;
            }

            self.mailbox.notify.notified().await;
        }
    }

    /// Take the next status if one is queued
    pub fn try_recv(&mut self) -> Option<OperationStatus> {
        self.mailbox.queue.lock().pop_front()
    }

    /// Statuses evicted from this subscriber's queue so far
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.lock().remove(&self.id);
            debug!(subscriber = self.id, "Subscriber detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingerlink_types::{Failure, OperationKind, Outcome};
    use pretty_assertions::assert_eq;

    fn pending(n: usize) -> OperationStatus {
        OperationStatus::pending(OperationKind::Enrolling, format!("step {}", n))
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let broadcaster = StatusBroadcaster::new(4);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        broadcaster.publish(pending(1));

        assert_eq!(a.recv().await, Some(pending(1)));
        assert_eq!(b.recv().await, Some(pending(1)));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let broadcaster = StatusBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe();

        let publisher = broadcaster.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish(OperationStatus::idle());
        });

        assert_eq!(subscription.recv().await, Some(OperationStatus::idle()));
    }

    #[test]
    fn test_full_queue_drops_oldest_progress_first() {
        let broadcaster = StatusBroadcaster::new(3);
        let mut subscription = broadcaster.subscribe();

        let failed = OperationStatus::failed(OperationKind::Enrolling, Failure::EnrollMismatch);
        broadcaster.publish(failed.clone());
        broadcaster.publish(pending(1));
        broadcaster.publish(pending(2));
        broadcaster.publish(OperationStatus::idle());

        assert_eq!(subscription.try_recv(), Some(failed));
        assert_eq!(subscription.try_recv(), Some(pending(2)));
        assert_eq!(subscription.try_recv(), Some(OperationStatus::idle()));
        assert_eq!(subscription.try_recv(), None);
        assert_eq!(subscription.dropped(), 1);
    }

    #[test]
    fn test_all_terminal_drops_oldest() {
        let broadcaster = StatusBroadcaster::new(1);
        let mut subscription = broadcaster.subscribe();

        broadcaster.publish(OperationStatus::success(OperationKind::Clearing, "a"));
        broadcaster.publish(OperationStatus::success(OperationKind::Clearing, "b"));

        let status = subscription.try_recv().unwrap();
        assert_eq!(status.outcome, Outcome::Success);
        assert_eq!(status.message, "b");
    }

    #[test]
    fn test_slow_subscriber_does_not_affect_others() {
        let broadcaster = StatusBroadcaster::new(2);
        let _slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for n in 0..50 {
            broadcaster.publish(pending(n));
            assert_eq!(fast.try_recv(), Some(pending(n)));
        }
    }

    #[test]
    fn test_drop_unsubscribes() {
        let broadcaster = StatusBroadcaster::new(2);
        let first = broadcaster.subscribe();
        let second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(first);
        broadcaster.unsubscribe(second);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_after_broadcaster_dropped() {
        let broadcaster = StatusBroadcaster::new(2);
        let mut subscription = broadcaster.subscribe_with(OperationStatus::idle());
        drop(broadcaster);

        assert_eq!(subscription.recv().await, Some(OperationStatus::idle()));
        assert_eq!(subscription.recv().await, None);
    }
}
