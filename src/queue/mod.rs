//! Priority queue
//!
//! Comparator-parameterised min-heap used by the actions to walk jobs and
//! tasks under the session's pluggable orderings. `pop` returns the item
//! the comparator ranks first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Three-way comparator shared by queues and the session's ordering stack.
pub type CompareFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Reverse a comparator, e.g. to turn a best-first queue into worst-first.
pub fn reverse<T: 'static>(cmp: CompareFn<T>) -> CompareFn<T> {
    Arc::new(move |l, r| (*cmp)(l, r).reverse())
}

pub struct PriorityQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    cmp: CompareFn<T>,
}

impl<T> PriorityQueue<T> {
    pub fn new(cmp: CompareFn<T>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            cmp,
        }
    }

    pub fn push(&mut self, item: T) {
        self.heap.push(Entry {
            item,
            cmp: Arc::clone(&self.cmp),
        });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

struct Entry<T> {
    item: T,
    cmp: CompareFn<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        (*self.cmp)(&self.item, &other.item) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum; reversing yields min-heap behaviour.
        (*self.cmp)(&self.item, &other.item).reverse()
    }
}
