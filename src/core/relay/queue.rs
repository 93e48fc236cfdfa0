//! Unbounded many-producer / single-consumer input queue.
//!
//! Producers never wait. The single consumer (the session controller) awaits
//! [`InputQueue::pop`]; a flush discards everything currently queued with
//! [`InputQueue::drain`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::staleness::Timestamp;

/// A text fragment waiting to be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub text: String,
    pub enqueued_at: Timestamp,
    pub end_of_segment: bool,
}

impl PendingInput {
    /// Stamp `text` with the current instant.
    pub fn now(text: impl Into<String>, end_of_segment: bool) -> Self {
        Self {
            text: text.into(),
            enqueued_at: Timestamp::now(),
            end_of_segment,
        }
    }
}

/// Items carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Input(PendingInput),
    /// The worker must terminate after observing this item.
    Shutdown,
}

/// Shared handle to the input queue. Clones refer to the same queue.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    items: Arc<Mutex<VecDeque<QueueItem>>>,
    notify: Arc<Notify>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and wake the consumer.
    pub fn push(&self, item: QueueItem) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Wait for the next item in FIFO order.
    pub async fn pop(&self) -> QueueItem {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop).
    pub fn try_pop(&self) -> Option<QueueItem> {
        self.items.lock().pop_front()
    }

    /// Discard every queued item. Returns how many were discarded.
    pub fn drain(&self) -> usize {
        let mut items = self.items.lock();
        let discarded = items.len();
        items.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
