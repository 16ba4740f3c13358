//! Time-ordered queue of deferred outbound work.

use std::collections::BTreeMap;

/// Items released once their send time has passed, in send-time order and
/// FIFO among equal times.
#[derive(Clone, Debug)]
pub struct DelayedQueue<T> {
    items: BTreeMap<(u64, u64), T>,
    next_seq: u64,
}

impl<T> Default for DelayedQueue<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> DelayedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, send_at_ms: u64, item: T) {
        self.items.insert((send_at_ms, self.next_seq), item);
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.items.keys().next().map(|(t, _)| *t)
    }

    /// Remove everything due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<T> {
        let later = self.items.split_off(&(now_ms.saturating_add(1), 0));
        let due = std::mem::replace(&mut self.items, later);
        due.into_values().collect()
    }

    /// Drop queued items matching `predicate`.
    pub fn remove_where<F: FnMut(&T) -> bool>(&mut self, mut predicate: F) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !predicate(item));
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_due_ordering() {
        let mut queue = DelayedQueue::new();
        queue.push(300, "c");
        queue.push(100, "a");
        queue.push(100, "b");
        queue.push(900, "d");

        assert_eq!(queue.next_deadline(), Some(100));
        assert!(queue.pop_due(99).is_empty());
        assert_eq!(queue.pop_due(300), vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(900));
    }

    #[test]
    fn test_remove_where() {
        let mut queue = DelayedQueue::new();
        queue.push(10, 1);
        queue.push(20, 2);
        queue.push(30, 3);
        assert_eq!(queue.remove_where(|v| v % 2 == 1), 2);
        assert_eq!(queue.pop_due(u64::MAX), vec![2]);
        assert!(queue.is_empty());
    }
}
