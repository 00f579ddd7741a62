//! Bounded, lossy FIFO channel.
//!
//! The pump's answer to backpressure: a fixed-capacity queue whose producer
//! side never blocks. When the queue is full the configured
//! [`OverflowPolicy`] decides which frame to lose — overload is an expected,
//! non-exceptional condition here, so a full queue is reported as an
//! outcome, not an error.
//!
//! The default policy is [`OverflowPolicy::DropIncoming`]: the frame being
//! pushed is discarded and the queue keeps the *oldest* unprocessed frame.
//! [`OverflowPolicy::DropOldest`] is the "prefer latest" alternative; it
//! evicts the head of the queue to make room. The two policies differ only
//! in *which* frame survives — neither ever duplicates or reorders the
//! survivors.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;
use tracing::trace;

/// What to do with a push when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming item; the queue keeps the oldest unprocessed
    /// item. This is the reference behavior.
    #[default]
    DropIncoming,

    /// Evict the oldest queued item to make room for the incoming one.
    DropOldest,
}

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was enqueued within capacity.
    Enqueued,

    /// The queue was full and the incoming item was discarded.
    DroppedIncoming,

    /// The queue was full; the oldest queued item was evicted and the
    /// incoming item enqueued in its place.
    ReplacedOldest,
}

impl PushOutcome {
    /// Whether an item (incoming or queued) was lost on this push.
    pub fn dropped(&self) -> bool {
        !matches!(self, PushOutcome::Enqueued)
    }
}

/// Fixed-capacity FIFO queue with a non-blocking producer side and a
/// suspending consumer side.
///
/// One instance is exclusively owned by one pump; the producer and consumer
/// loops share it through an `Arc`. `push` never blocks and never fails;
/// [`pop`](BoundedChannel::pop) is the consumer's single suspension point.
pub struct BoundedChannel<T> {
    queue: Mutex<VecDeque<T>>,
    /// One permit per queued item; closed to wake the consumer on shutdown.
    items: Semaphore,
    capacity: usize,
    policy: OverflowPolicy,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl<T> BoundedChannel<T> {
    /// Create a channel with the given capacity and the default
    /// drop-incoming policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::default())
    }

    /// Create a channel with an explicit overflow policy.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "channel capacity must be at least 1");
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            items: Semaphore::new(0),
            capacity,
            policy,
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attempt to enqueue an item without blocking.
    ///
    /// Returns the outcome; a full queue applies the overflow policy rather
    /// than failing. Pushing into a closed channel drops the item.
    pub fn push(&self, item: T) -> PushOutcome {
        if self.items.is_closed() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::DroppedIncoming;
        }

        let mut queue = self.queue.lock().expect("channel queue poisoned");

        if queue.len() < self.capacity {
            queue.push_back(item);
            drop(queue);
            self.pushed.fetch_add(1, Ordering::Relaxed);
            self.items.add_permits(1);
            return PushOutcome::Enqueued;
        }

        match self.policy {
            OverflowPolicy::DropIncoming => {
                drop(queue);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Queue full, dropping incoming item");
                PushOutcome::DroppedIncoming
            }
            OverflowPolicy::DropOldest => {
                // Evict the head; permit count stays equal to queue length
                queue.pop_front();
                queue.push_back(item);
                drop(queue);
                self.pushed.fetch_add(1, Ordering::Relaxed);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Queue full, evicting oldest item");
                PushOutcome::ReplacedOldest
            }
        }
    }

    /// Wait until an item is available and dequeue it (FIFO).
    ///
    /// Returns `None` once the channel is closed and drained. Cancel-safe:
    /// dropping the returned future before completion consumes nothing.
    pub async fn pop(&self) -> Option<T> {
        match self.items.acquire().await {
            Ok(permit) => {
                permit.forget();
                let mut queue = self.queue.lock().expect("channel queue poisoned");
                queue.pop_front()
            }
            // Closed: drain whatever is still queued, then report end
            Err(_) => self.queue.lock().expect("channel queue poisoned").pop_front(),
        }
    }

    /// Dequeue an item if one is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        match self.items.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.queue.lock().expect("channel queue poisoned").pop_front()
            }
            Err(_) => {
                if self.items.is_closed() {
                    self.queue.lock().expect("channel queue poisoned").pop_front()
                } else {
                    None
                }
            }
        }
    }

    /// Close the channel, waking any pending `pop`.
    ///
    /// Subsequent pushes are dropped; pending items remain poppable.
    pub fn close(&self) {
        self.items.close();
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.items.is_closed()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("channel queue poisoned").len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items successfully enqueued so far.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total items lost to the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("pushed", &self.pushed())
            .field("dropped", &self.dropped())
            .finish()
    }
}
