//! Bounded priority queue backing each writer. Default capacity is large enough
//! that enqueue never blocks the result processor in practice; when it does fill
//! (a writer stuck reconnecting during a result storm), the oldest entry is
//! evicted to make room rather than rejecting the newest one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::record::PerfdataRecord;

pub const DEFAULT_CAPACITY: usize = 10_000_000;

struct QueueEntry {
    priority: u8,
    seq: u64,
    record: PerfdataRecord,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest; a lower priority number is more urgent and
        // should sort greater, and within equal priority an older (smaller) seq
        // should sort greater so the queue drains FIFO within a severity class.
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    capacity: usize,
    next_seq: AtomicU64,
    notify: Notify,
}

pub struct EnqueueOutcome {
    pub evicted: bool,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to enqueue without ever waiting; evicts the oldest entry if full.
    pub fn try_enqueue(&self, record: PerfdataRecord) -> EnqueueOutcome {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = record.priority();
        let mut heap = self.heap.lock();

        let evicted = if heap.len() >= self.capacity {
            let mut items = std::mem::take(&mut *heap).into_vec();
            if let Some(idx) = items
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.seq)
                .map(|(i, _)| i)
            {
                items.swap_remove(idx);
            }
            *heap = items.into();
            true
        } else {
            false
        };

        heap.push(QueueEntry { priority, seq, record });
        drop(heap);
        self.notify.notify_one();
        EnqueueOutcome { evicted }
    }

    /// Pop up to `max` of the most urgent/oldest entries without waiting.
    pub fn pop_batch(&self, max: usize) -> Vec<PerfdataRecord> {
        let mut heap = self.heap.lock();
        let mut out = Vec::with_capacity(max.min(heap.len()));
        while out.len() < max {
            match heap.pop() {
                Some(entry) => out.push(entry.record),
                None => break,
            }
        }
        out
    }

    /// Discard every pending entry, e.g. on `pause()`.
    pub fn clear(&self) -> usize {
        let mut heap = self.heap.lock();
        let n = heap.len();
        heap.clear();
        n
    }

    pub async fn wait_for_item(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::CheckState;
    use chrono::Utc;

    fn record(state: CheckState) -> PerfdataRecord {
        PerfdataRecord {
            checkable: "web1".into(),
            kind: "host",
            timestamp: Utc::now(),
            state,
            values: Vec::new(),
        }
    }

    #[test]
    fn pops_most_urgent_first() {
        let q = PriorityQueue::new(10);
        q.try_enqueue(record(CheckState::Ok));
        q.try_enqueue(record(CheckState::Critical));
        q.try_enqueue(record(CheckState::Warning));
        let batch = q.pop_batch(3);
        assert_eq!(batch[0].state, CheckState::Critical);
        assert_eq!(batch[1].state, CheckState::Warning);
        assert_eq!(batch[2].state, CheckState::Ok);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let q = PriorityQueue::new(2);
        q.try_enqueue(record(CheckState::Ok));
        q.try_enqueue(record(CheckState::Ok));
        let outcome = q.try_enqueue(record(CheckState::Ok));
        assert!(outcome.evicted);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn fifo_within_same_priority() {
        let q = PriorityQueue::new(10);
        for i in 0..3 {
            let mut r = record(CheckState::Ok);
            r.checkable = format!("host{i}");
            q.try_enqueue(r);
        }
        let batch = q.pop_batch(3);
        assert_eq!(batch[0].checkable, "host0");
        assert_eq!(batch[2].checkable, "host2");
    }
}
