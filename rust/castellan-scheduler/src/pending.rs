//! The pending-check set: an ordered index over checkable identity keyed by
//! `next_check`, scanned once per tick.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use castellan_registry::ObjectId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, Eq, PartialEq)]
struct Entry {
    next_check: DateTime<Utc>,
    id: ObjectId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.next_check.cmp(&other.next_check).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct PendingSet {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ObjectId, next_check: DateTime<Utc>) {
        self.heap.lock().push(Reverse(Entry { next_check, id }));
    }

    /// Remove and return every entry whose `next_check` is at or before `now`.
    pub fn drain_due(&self, now: DateTime<Utc>) -> Vec<ObjectId> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while let Some(Reverse(top)) = heap.peek() {
            if top.next_check > now {
                break;
            }
            let Reverse(entry) = heap.pop().unwrap();
            due.push(entry.id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::ObjectKind;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn drain_due_only_returns_entries_at_or_before_now() {
        let set = PendingSet::new();
        let now = Utc::now();
        set.insert(ObjectId::new(ObjectKind::Host, "a"), now - ChronoDuration::seconds(5));
        set.insert(ObjectId::new(ObjectKind::Host, "b"), now + ChronoDuration::seconds(60));
        let due = set.drain_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "a");
        assert_eq!(set.len(), 1);
    }
}
