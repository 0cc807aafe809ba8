//! Read cache: a bounded LRU protecting the hot path from disk.
//!
//! Hash index into a slab-backed doubly-linked recency list. A hit splices
//! the entry to the head; inserting into a full cache evicts from the tail.

use std::collections::HashMap;

const NIL: usize = usize::MAX;

struct Slot {
    key: Vec<u8>,
    value: Vec<u8>,
    prev: usize,
    next: usize,
}

pub(crate) struct LruCache {
    capacity: usize,
    map: HashMap<Vec<u8>, usize>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Returns the cached value and marks the entry most recently used.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        Some(self.slots[idx].value.clone())
    }

    /// Inserts or refreshes `key`, evicting the least recently used entry
    /// when at capacity.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].value = value;
            self.move_to_front(idx);
            return;
        }

        if self.map.len() >= self.capacity {
            self.evict_tail();
        }

        let idx = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                };
                i
            }
            None => {
                self.slots.push(Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                });
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);
    }

    /// Drops `key` from the cache, if present.
    pub fn remove(&mut self, key: &[u8]) {
        if let Some(idx) = self.map.remove(key) {
            self.unlink(idx);
            self.slots[idx].key.clear();
            self.slots[idx].value.clear();
            self.free.push(idx);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    /// Detaches a currently linked slot from the recency list.
    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn evict_tail(&mut self) {
        let idx = self.tail;
        if idx == NIL {
            return;
        }
        let key = std::mem::take(&mut self.slots[idx].key);
        self.unlink(idx);
        self.map.remove(&key);
        self.slots[idx].value.clear();
        self.free.push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn hit_and_miss() {
        let mut c = LruCache::new(4);
        c.insert(k("a"), k("1"));
        assert_eq!(c.get(b"a"), Some(k("1")));
        assert_eq!(c.get(b"b"), None);
    }

    #[test]
    fn capacity_plus_one_evicts_least_recent() {
        let mut c = LruCache::new(3);
        c.insert(k("a"), k("1"));
        c.insert(k("b"), k("2"));
        c.insert(k("c"), k("3"));
        c.insert(k("d"), k("4"));

        assert_eq!(c.get(b"a"), None, "least recently used entry is evicted");
        assert_eq!(c.get(b"b"), Some(k("2")));
        assert_eq!(c.get(b"d"), Some(k("4")));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn hit_splices_to_front() {
        let mut c = LruCache::new(2);
        c.insert(k("a"), k("1"));
        c.insert(k("b"), k("2"));

        // Touch "a" so "b" becomes the eviction victim.
        assert!(c.get(b"a").is_some());
        c.insert(k("c"), k("3"));

        assert_eq!(c.get(b"b"), None);
        assert_eq!(c.get(b"a"), Some(k("1")));
    }

    #[test]
    fn reinsert_updates_value_in_place() {
        let mut c = LruCache::new(2);
        c.insert(k("a"), k("1"));
        c.insert(k("a"), k("2"));

        assert_eq!(c.len(), 1);
        assert_eq!(c.get(b"a"), Some(k("2")));
    }

    #[test]
    fn remove_then_slot_reuse() {
        let mut c = LruCache::new(2);
        c.insert(k("a"), k("1"));
        c.insert(k("b"), k("2"));
        c.remove(b"a");

        assert_eq!(c.len(), 1);
        assert_eq!(c.get(b"a"), None);

        c.insert(k("c"), k("3"));
        c.insert(k("d"), k("4"));
        assert_eq!(c.get(b"b"), None, "b was the tail once c and d arrived");
        assert_eq!(c.get(b"c"), Some(k("3")));
        assert_eq!(c.get(b"d"), Some(k("4")));
    }

    #[test]
    fn single_entry_cache() {
        let mut c = LruCache::new(1);
        c.insert(k("a"), k("1"));
        c.insert(k("b"), k("2"));
        assert_eq!(c.get(b"a"), None);
        assert_eq!(c.get(b"b"), Some(k("2")));
    }
}
