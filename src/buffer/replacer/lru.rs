//! LRU (Least Recently Used) replacement policy.
//!
//! Ordering is by when a value was last *inserted*, which for the buffer
//! pool means when its frame last became unpinned.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Slot in the node arena.
type Slot = usize;

struct Node<T> {
    value: T,
    /// Towards the head (more recently inserted).
    prev: Option<Slot>,
    /// Towards the tail (less recently inserted).
    next: Option<Slot>,
}

/// Doubly-linked list over an index arena.
///
/// Vacated arena slots are pushed on `free_slots` and reused by the next
/// insert, so the arena never grows past the peak number of tracked values.
struct LruList<T> {
    nodes: Vec<Node<T>>,
    free_slots: Vec<Slot>,
    index: HashMap<T, Slot>,
    head: Option<Slot>,
    tail: Option<Slot>,
}

impl<T: Copy + Eq + Hash> LruList<T> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_slots: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn push_front(&mut self, value: T) {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.nodes[old_head].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.index.insert(value, slot);
    }

    /// Unlink `slot` and recycle it.
    fn unlink(&mut self, slot: Slot) -> T {
        let (prev, next, value) = {
            let node = &self.nodes[slot];
            (node.prev, node.next, node.value)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        self.index.remove(&value);
        self.free_slots.push(slot);
        value
    }
}

/// Thread-safe LRU replacer over any small copyable key.
///
/// The buffer pool uses it with [`FrameId`](crate::FrameId), but nothing here
/// knows about frames or pins: callers decide what is eligible and only
/// insert those values.
///
/// Every operation takes the replacer's own lock and is O(1) amortized.
///
/// # Example
/// ```
/// use pagepool::buffer::replacer::LruReplacer;
///
/// let lru = LruReplacer::new();
/// lru.insert(1);
/// lru.insert(2);
/// lru.insert(1); // refresh: 1 is now the most recent
/// assert_eq!(lru.victim(), Some(2));
/// assert_eq!(lru.victim(), Some(1));
/// assert_eq!(lru.victim(), None);
/// ```
pub struct LruReplacer<T> {
    list: Mutex<LruList<T>>,
}

impl<T: Copy + Eq + Hash> LruReplacer<T> {
    pub fn new() -> Self {
        Self {
            list: Mutex::new(LruList::new()),
        }
    }

    /// Track `value` as the most recently used entry.
    ///
    /// If it is already tracked it moves to the most-recent end.
    pub fn insert(&self, value: T) {
        let mut list = self.list.lock();
        if let Some(&slot) = list.index.get(&value) {
            list.unlink(slot);
        }
        list.push_front(value);
    }

    /// Remove and return the least recently used entry.
    pub fn victim(&self) -> Option<T> {
        let mut list = self.list.lock();
        let tail = list.tail?;
        Some(list.unlink(tail))
    }

    /// Stop tracking `value`. Returns whether it was tracked.
    pub fn erase(&self, value: &T) -> bool {
        let mut list = self.list.lock();
        match list.index.get(value) {
            Some(&slot) => {
                list.unlink(slot);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.list.lock().index.contains_key(value)
    }

    /// Number of tracked entries.
    pub fn size(&self) -> usize {
        self.list.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T: Copy + Eq + Hash> Default for LruReplacer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order_is_insert_order() {
        let lru = LruReplacer::new();
        lru.insert('a');
        lru.insert('b');
        lru.insert('c');

        assert_eq!(lru.size(), 3);
        assert_eq!(lru.victim(), Some('a'));
        assert_eq!(lru.victim(), Some('b'));
        assert_eq!(lru.victim(), Some('c'));
        assert_eq!(lru.victim(), None);
        assert!(lru.is_empty());
    }

    #[test]
    fn test_reinsert_moves_to_front() {
        let lru = LruReplacer::new();
        for i in 1..=6 {
            lru.insert(i);
        }
        lru.insert(1);
        assert_eq!(lru.size(), 6);

        assert_eq!(lru.victim(), Some(2));
        assert_eq!(lru.victim(), Some(3));
        assert_eq!(lru.victim(), Some(4));
    }

    #[test]
    fn test_erase_head_tail_and_middle() {
        let lru = LruReplacer::new();
        for i in 1..=5 {
            lru.insert(i);
        }

        // tail
        assert!(lru.erase(&1));
        // head
        assert!(lru.erase(&5));
        // middle
        assert!(lru.erase(&3));
        assert!(!lru.erase(&3));
        assert!(!lru.erase(&42));

        assert_eq!(lru.size(), 2);
        assert!(!lru.contains(&3));
        assert_eq!(lru.victim(), Some(2));
        assert_eq!(lru.victim(), Some(4));
        assert_eq!(lru.victim(), None);
    }

    #[test]
    fn test_erase_only_element() {
        let lru = LruReplacer::new();
        lru.insert(7);
        assert!(lru.erase(&7));
        assert_eq!(lru.victim(), None);

        // List is usable again after going empty
        lru.insert(8);
        assert_eq!(lru.victim(), Some(8));
    }

    #[test]
    fn test_arena_slots_are_recycled() {
        let lru = LruReplacer::new();
        for round in 0..100 {
            lru.insert(round);
            lru.insert(round + 1000);
            assert_eq!(lru.victim(), Some(round));
            assert!(lru.erase(&(round + 1000)));
        }
        assert!(lru.list.lock().nodes.len() <= 2);
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let lru = Arc::new(LruReplacer::new());
        let mut handles = vec![];

        for t in 0..8 {
            let lru = Arc::clone(&lru);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    lru.insert(t * 100 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lru.size(), 800);
        let mut seen = 0;
        while lru.victim().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 800);
    }
}
