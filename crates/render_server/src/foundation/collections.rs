//! Specialized collection types

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<K> {
    key: Option<K>,
    prev: usize,
    next: usize,
}

/// Insertion-ordered set with O(1) insert, remove and membership tests.
///
/// Slots live in a free list so removed entries are recycled; iteration order is
/// kept by an intrusive doubly linked list threaded through the slots, so slot
/// reuse never disturbs the order in which keys were inserted.
#[derive(Debug, Clone)]
pub struct OrderedSet<K> {
    nodes: Vec<Node<K>>,
    free_indices: Vec<usize>,
    lookup: HashMap<K, usize>,
    head: usize,
    tail: usize,
}

impl<K: Copy + Eq + Hash> OrderedSet<K> {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_indices: Vec::new(),
            lookup: HashMap::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Append `key` at the end. Returns `false` if it was already present.
    pub fn insert(&mut self, key: K) -> bool {
        if self.lookup.contains_key(&key) {
            return false;
        }

        let node = Node { key: Some(key), prev: self.tail, next: NIL };
        let index = if let Some(index) = self.free_indices.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        };

        if self.tail == NIL {
            self.head = index;
        } else {
            self.nodes[self.tail].next = index;
        }
        self.tail = index;
        self.lookup.insert(key, index);
        true
    }

    /// Remove `key`. Returns `false` if it was not present.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(index) = self.lookup.remove(key) else {
            return false;
        };

        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }

        self.nodes[index] = Node { key: None, prev: NIL, next: NIL };
        self.free_indices.push(index);
        true
    }

    /// Whether `key` is in the set
    pub fn contains(&self, key: &K) -> bool {
        self.lookup.contains_key(key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Remove every key
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_indices.clear();
        self.lookup.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Iterate keys in insertion order
    pub fn iter(&self) -> OrderedSetIter<'_, K> {
        OrderedSetIter { set: self, cursor: self.head }
    }

    /// Copy the keys out in insertion order
    pub fn to_vec(&self) -> Vec<K> {
        self.iter().collect()
    }
}

impl<K: Copy + Eq + Hash> Default for OrderedSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over an [`OrderedSet`] in insertion order
pub struct OrderedSetIter<'a, K> {
    set: &'a OrderedSet<K>,
    cursor: usize,
}

impl<K: Copy> Iterator for OrderedSetIter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.set.nodes[self.cursor];
        self.cursor = node.next;
        node.key
    }
}

impl<'a, K: Copy + Eq + Hash> IntoIterator for &'a OrderedSet<K> {
    type Item = K;
    type IntoIter = OrderedSetIter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
