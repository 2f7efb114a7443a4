//! General-capacity ring buffer

use super::SlotRing;

/// Ring buffer of any capacity, wrapping with modulo arithmetic.
///
/// Designed to sit behind a single mutex shared by one producer and any
/// number of consumers; it performs no synchronization itself.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Preallocated slots
    items: Vec<T>,
    /// Slot of the most recently pushed element
    pos: usize,
    /// Number of live elements
    count: usize,
    /// Pushes since the last resize
    push_count: u64,
}

impl<T: Default> RingBuffer<T> {
    pub fn new(min_size: usize) -> Self {
        assert!(min_size > 0, "ring buffer size must be > 0");
        Self {
            items: std::iter::repeat_with(T::default).take(min_size).collect(),
            pos: min_size - 1,
            count: 0,
            push_count: 0,
        }
    }

    #[inline]
    fn slot(&self, index: usize) -> usize {
        let size = self.items.len();
        (self.pos + size - index) % size
    }
}

impl<T: Default + Clone + Send> SlotRing<T> for RingBuffer<T> {
    fn with_min_size(min_size: usize) -> Self {
        Self::new(min_size)
    }

    fn push(&mut self, value: T) {
        self.pos = (self.pos + 1) % self.items.len();
        self.items[self.pos] = value;
        if self.count < self.items.len() {
            self.count += 1;
        }
        self.push_count += 1;
    }

    fn pop(&mut self) -> T {
        if self.count == 0 {
            return T::default();
        }
        let oldest = self.slot(self.count - 1);
        self.count -= 1;
        self.items[oldest].clone()
    }

    fn get(&self, index: usize) -> Option<&T> {
        if index >= self.items.len() {
            return None;
        }
        Some(&self.items[self.slot(index)])
    }

    fn next_slot_mut(&mut self) -> &mut T {
        let next = (self.pos + 1) % self.items.len();
        &mut self.items[next]
    }

    fn resize(&mut self, min_size: usize) {
        *self = Self::new(min_size);
    }

    fn clear(&mut self) {
        self.count = 0;
    }

    fn len(&self) -> usize {
        self.count
    }

    fn capacity(&self) -> usize {
        self.items.len()
    }

    fn push_count(&self) -> u64 {
        self.push_count
    }
}

impl<T: Default + Clone + Send> std::ops::Index<usize> for RingBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(v) => v,
            None => panic!(
                "ring index {index} out of range for capacity {}",
                self.items.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_exact_capacity() {
        let ring = RingBuffer::<u8>::new(5);
        assert_eq!(ring.capacity(), 5);
    }

    #[test]
    fn test_index_newest_to_oldest() {
        let mut ring = RingBuffer::new(3);
        for v in [1, 2, 3, 4] {
            ring.push(v);
        }
        assert_eq!(ring[0], 4);
        assert_eq!(ring[1], 3);
        assert_eq!(ring[2], 2);
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_range_panics() {
        let ring = RingBuffer::<u8>::new(2);
        let _ = ring[2];
    }

    #[test]
    #[should_panic]
    fn test_zero_size_panics() {
        let _ = RingBuffer::<u8>::new(0);
    }
}
