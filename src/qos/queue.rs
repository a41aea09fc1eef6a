//! Bounded priority queue backing the QoS dispatcher.
//!
//! A binary max-heap of queued messages keyed on priority class, with a
//! monotonic ingest timestamp as tie-breaker and a total-payload-bytes
//! budget. When the budget is exceeded the heap flips into eviction mode
//! (lowest priority first), sheds items until the bound holds, then flips
//! back. One comparator serving both disciplines keeps a single heap; the
//! two O(n) rebuilds only run under pressure.

use std::time::Instant;

use log::debug;

use crate::message::Message;
use crate::metrics;
use crate::qos::QosError;

/// A message plus the instant it entered the queue. The timestamp is
/// reassigned on re-enqueue after a failed delivery, so retries re-age at
/// the back of their priority class under the default newest-first policy.
struct QueuedItem {
    msg: Message,
    ingested_at: Instant,
}

/// Priority-ordered, byte-bounded message buffer. Single-owner: only the
/// dispatcher task touches it, so there is no interior locking.
pub struct PriorityQueue {
    items: Vec<QueuedItem>,
    size_bytes: usize,
    max_queue_bytes: usize,
    max_message_bytes: usize,
    prioritize_oldest: bool,
    /// While set, the comparator inverts so that pops yield the item that
    /// would otherwise be served last. Only trim() sets this.
    evicting: bool,
}

impl PriorityQueue {
    pub fn new(max_queue_bytes: usize, max_message_bytes: usize, prioritize_oldest: bool) -> Self {
        PriorityQueue {
            items: Vec::new(),
            size_bytes: 0,
            max_queue_bytes,
            max_message_bytes,
            prioritize_oldest,
            evicting: false,
        }
    }

    /// Insert a message with a fresh ingest timestamp, then shed load until
    /// the byte budget holds. Rejects payloads over the per-message limit.
    pub fn enqueue(&mut self, msg: Message) -> Result<(), QosError> {
        let size = msg.payload_len();
        if size > self.max_message_bytes {
            return Err(QosError::OversizeMessage {
                size,
                limit: self.max_message_bytes,
            });
        }

        self.size_bytes += size;
        self.items.push(QueuedItem {
            msg,
            ingested_at: Instant::now(),
        });
        self.sift_up(self.items.len() - 1);
        self.trim();
        Ok(())
    }

    /// Remove and return the highest-priority message, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<Message> {
        self.pop().map(|item| item.msg)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of payload lengths currently held.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Evict until `size_bytes <= max_queue_bytes`, least important first.
    fn trim(&mut self) {
        if self.size_bytes <= self.max_queue_bytes {
            return;
        }

        self.evicting = true;
        self.rebuild();
        while self.size_bytes > self.max_queue_bytes {
            match self.pop() {
                Some(dropped) => {
                    debug!(
                        "queue over budget: evicted {} byte {} message {}",
                        dropped.msg.payload_len(),
                        dropped.msg.priority,
                        dropped.msg.id
                    );
                    metrics::inc_trim_evicted();
                }
                None => break,
            }
        }
        self.evicting = false;
        self.rebuild();
    }

    fn pop(&mut self) -> Option<QueuedItem> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let item = self.items.pop();
        if let Some(ref item) = item {
            self.size_bytes -= item.msg.payload_len();
        }
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        item
    }

    /// True when `a` should surface before `b` under the current mode.
    /// Eviction mode is the exact inverse of serving order: trim pops from
    /// the back of the line, so the last message that would be served is the
    /// first one shed.
    fn outranks(&self, a: &QueuedItem, b: &QueuedItem) -> bool {
        if self.evicting {
            self.serves_first(b, a)
        } else {
            self.serves_first(a, b)
        }
    }

    /// Serving order: higher priority first; within a class, newest first by
    /// default (stale work is less useful), oldest first under
    /// `prioritize_oldest`.
    fn serves_first(&self, a: &QueuedItem, b: &QueuedItem) -> bool {
        if a.msg.priority != b.msg.priority {
            return a.msg.priority > b.msg.priority;
        }
        if self.prioritize_oldest {
            a.ingested_at < b.ingested_at
        } else {
            a.ingested_at > b.ingested_at
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.outranks(&self.items[idx], &self.items[parent]) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut best = idx;
            if left < len && self.outranks(&self.items[left], &self.items[best]) {
                best = left;
            }
            if right < len && self.outranks(&self.items[right], &self.items[best]) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.items.swap(idx, best);
            idx = best;
        }
    }

    /// Floyd heapify, used when the comparator direction flips.
    fn rebuild(&mut self) {
        for idx in (0..self.items.len() / 2).rev() {
            self.sift_down(idx);
        }
    }
}
