//! Releases out-of-order results in sequence order.
//!
//! Workers finish frames in any order; the buffer holds each result until every
//! lower sequence number has been released or explicitly skipped.

use std::collections::VecDeque;

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Ready(T),
    /// The sequence will never produce an item; released as a gap
    Skipped,
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Index `i` holds sequence `base_seq + i`
    slots: VecDeque<Slot<T>>,
    base_seq: u64,
    /// Ready items currently held
    count: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first_seq: u64) -> Self {
        Self {
            slots: VecDeque::new(),
            base_seq: first_seq,
            count: 0,
        }
    }

    /// Buffer `item` under `seq`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds on a duplicate or already released sequence number.
    pub fn insert(&mut self, seq: u64, item: T) {
        let index = self.reserve(seq);
        debug_assert!(self.slots[index].is_empty(), "Duplicate sequence number: {seq}");
        self.slots[index] = Slot::Ready(item);
        self.count += 1;
    }

    /// Mark `seq` as a gap so later sequences are not held back by it
    pub fn skip(&mut self, seq: u64) {
        let index = self.reserve(seq);
        debug_assert!(self.slots[index].is_empty(), "Duplicate sequence number: {seq}");
        self.slots[index] = Slot::Skipped;
    }

    fn reserve(&mut self, seq: u64) -> usize {
        debug_assert!(
            seq >= self.base_seq,
            "Sequence number {seq} is before base {}",
            self.base_seq
        );
        let index = seq.saturating_sub(self.base_seq) as usize;
        while self.slots.len() <= index {
            self.slots.push_back(Slot::Empty);
        }
        index
    }

    /// Next item in sequence order, passing over skipped sequences
    pub fn pop_ready(&mut self) -> Option<T> {
        loop {
            match self.slots.pop_front() {
                Some(Slot::Skipped) => self.base_seq += 1,
                Some(Slot::Ready(item)) => {
                    self.base_seq += 1;
                    self.count -= 1;
                    return Some(item);
                }
                Some(Slot::Empty) => {
                    self.slots.push_front(Slot::Empty);
                    return None;
                }
                None => return None,
            }
        }
    }

    /// All items releasable right now, in sequence order
    pub fn drain_ready(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.pop_ready()).collect()
    }

    /// Sequence number the buffer is waiting on
    pub fn next_seq(&self) -> u64 {
        self.base_seq
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_in_order() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(2, "c");
        buffer.insert(0, "a");
        assert_eq!(buffer.drain_ready(), vec!["a"]);
        assert_eq!(buffer.next_seq(), 1);

        buffer.insert(1, "b");
        assert_eq!(buffer.drain_ready(), vec!["b", "c"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_gap_holds_back_later_items() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(1, 10);
        buffer.insert(3, 30);
        assert_eq!(buffer.pop_ready(), None);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_skipped_sequences_are_passed_over() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(3, 30);
        buffer.insert(1, 10);
        buffer.skip(0);
        assert_eq!(buffer.drain_ready(), vec![10]);

        buffer.skip(2);
        assert_eq!(buffer.drain_ready(), vec![30]);
        assert_eq!(buffer.next_seq(), 4);
    }

    #[test]
    #[should_panic(expected = "Duplicate sequence number")]
    #[cfg(debug_assertions)]
    fn test_duplicate_insert_panics() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, 1);
        buffer.insert(0, 2);
    }
}
