//! Fixed-capacity byte FIFO
//!
//! One instance buffers received bytes, another buffers bytes waiting for
//! the transmitter. Both live for the whole program and never allocate.

/// Default capacity of the receive and transmit queues
pub const QUEUE_SIZE: usize = 10;

/// Ring buffer of bytes
///
/// Invariants:
/// - `head` and `tail` stay in `[0, N)`
/// - `count == (tail - head) mod N`, with `count == N` when full
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    /// Index of the oldest byte
    head: usize,
    /// Index of the next free slot
    tail: usize,
    count: usize,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "ring buffer capacity must be at least 1");

    /// Create an empty buffer
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            storage: [0; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Append a byte at the tail
    ///
    /// Returns `false` and leaves the buffer untouched when it is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.storage[self.tail] = byte;
        self.tail = (self.tail + 1) % N;
        self.count += 1;
        true
    }

    /// Remove the byte at the head
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.storage[self.head];
        self.head = (self.head + 1) % N;
        self.count -= 1;
        Some(byte)
    }

    /// Oldest byte, without removing it
    pub fn peek_head(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.storage[self.head])
        }
    }

    /// Most recently pushed byte, without removing it
    pub fn peek_tail(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.storage[(self.tail + N - 1) % N])
        }
    }

    /// Byte `index` places behind the head
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.count {
            return None;
        }
        Some(self.storage[(self.head + index) % N])
    }

    /// Insert a byte `index` places behind the head, shifting the rest
    /// toward the tail
    ///
    /// Returns `false` and leaves the buffer untouched when it is full or
    /// `index` is past the tail.
    pub fn insert(&mut self, index: usize, byte: u8) -> bool {
        if self.is_full() || index > self.count {
            return false;
        }
        let mut slot = self.count;
        while slot > index {
            self.storage[(self.head + slot) % N] = self.storage[(self.head + slot - 1) % N];
            slot -= 1;
        }
        self.storage[(self.head + index) % N] = byte;
        self.tail = (self.tail + 1) % N;
        self.count += 1;
        true
    }

    /// Number of stored bytes
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Maximum number of stored bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slots still available
    pub const fn free(&self) -> usize {
        N - self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn is_full(&self) -> bool {
        self.count == N
    }

    /// Drop all stored bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_pop_fifo() {
        let mut queue = RingBuffer::<4>::new();
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_on_full_is_noop() {
        let mut queue = RingBuffer::<3>::new();
        for byte in [10, 20, 30] {
            assert!(queue.push(byte));
        }
        assert!(queue.is_full());
        assert!(!queue.push(40));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(10));
        assert_eq!(queue.pop(), Some(20));
        assert_eq!(queue.pop(), Some(30));
    }

    #[test]
    fn test_wraparound() {
        let mut queue = RingBuffer::<3>::new();
        for round in 0..10u8 {
            assert!(queue.push(round));
            assert!(queue.push(round.wrapping_add(100)));
            assert_eq!(queue.pop(), Some(round));
            assert_eq!(queue.pop(), Some(round.wrapping_add(100)));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek() {
        let mut queue = RingBuffer::<2>::new();
        assert_eq!(queue.peek_head(), None);
        assert_eq!(queue.peek_tail(), None);

        queue.push(7);
        assert_eq!(queue.peek_head(), Some(7));
        assert_eq!(queue.peek_tail(), Some(7));

        // tail index wraps to 0 here
        queue.push(8);
        assert_eq!(queue.peek_head(), Some(7));
        assert_eq!(queue.peek_tail(), Some(8));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_single_slot() {
        let mut queue = RingBuffer::<1>::new();
        assert!(queue.push(0xAB));
        assert!(!queue.push(0xCD));
        assert_eq!(queue.pop(), Some(0xAB));
        assert!(queue.push(0xCD));
        assert_eq!(queue.peek_tail(), Some(0xCD));
    }

    #[test]
    fn test_insert_across_wrap() {
        let mut queue = RingBuffer::<4>::new();
        queue.push(9);
        queue.push(9);
        queue.pop();
        queue.pop();
        // Head now sits at slot 2
        queue.push(1);
        queue.push(4);
        assert!(queue.insert(1, 2));
        assert!(queue.insert(2, 3));
        assert!(!queue.insert(0, 0));
        assert_eq!(queue.get(0), Some(1));
        assert_eq!(queue.get(3), Some(4));
        assert_eq!(queue.get(4), None);
        for expected in 1..=4 {
            assert_eq!(queue.pop(), Some(expected));
        }
    }

    #[test]
    fn test_insert_past_tail_rejected() {
        let mut queue = RingBuffer::<4>::new();
        assert!(!queue.insert(1, 5));
        assert!(queue.insert(0, 5));
        assert!(queue.insert(1, 6));
        assert_eq!(queue.peek_tail(), Some(6));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut queue = RingBuffer::<QUEUE_SIZE>::new();
        queue.push(1);
        queue.push(2);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.free(), QUEUE_SIZE);
        assert_eq!(queue.capacity(), QUEUE_SIZE);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u8>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn prop_matches_model(ops in proptest::collection::vec(op(), 0..200)) {
            let mut queue = RingBuffer::<QUEUE_SIZE>::new();
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(byte) => {
                        let accepted = queue.push(byte);
                        prop_assert_eq!(accepted, model.len() < QUEUE_SIZE);
                        if accepted {
                            model.push_back(byte);
                        }
                    }
                    Op::Pop => prop_assert_eq!(queue.pop(), model.pop_front()),
                }
                prop_assert_eq!(queue.len(), model.len());
                prop_assert_eq!(queue.peek_head(), model.front().copied());
                prop_assert_eq!(queue.peek_tail(), model.back().copied());
            }
        }

        #[test]
        fn prop_count_is_pushes_minus_pops(bytes in proptest::collection::vec(any::<u8>(), 0..=QUEUE_SIZE), pops in 0..=QUEUE_SIZE) {
            let mut queue = RingBuffer::<QUEUE_SIZE>::new();
            for &byte in &bytes {
                prop_assert!(queue.push(byte));
            }
            let pops = pops.min(bytes.len());
            for &expected in bytes.iter().take(pops) {
                prop_assert_eq!(queue.pop(), Some(expected));
            }
            prop_assert_eq!(queue.len(), bytes.len() - pops);
        }
    }
}
