//! Power-of-two ring buffer

use super::SlotRing;

/// Ring buffer whose capacity is rounded up to a power of two so that
/// wrap-around is a bitmask instead of a division.
#[derive(Debug, Clone)]
pub struct FastRingBuffer<T> {
    items: Vec<T>,
    mask: usize,
    pos: usize,
    count: usize,
    push_count: u64,
}

impl<T: Default> FastRingBuffer<T> {
    pub fn new(min_size: usize) -> Self {
        assert!(min_size > 0, "ring buffer size must be > 0");
        let size = min_size.next_power_of_two();
        Self {
            items: std::iter::repeat_with(T::default).take(size).collect(),
            mask: size - 1,
            pos: size - 1,
            count: 0,
            push_count: 0,
        }
    }

    #[inline]
    fn slot(&self, index: usize) -> usize {
        self.pos.wrapping_sub(index) & self.mask
    }
}

impl<T: Default + Clone + Send> SlotRing<T> for FastRingBuffer<T> {
    fn with_min_size(min_size: usize) -> Self {
        Self::new(min_size)
    }

    fn push(&mut self, value: T) {
        self.pos = (self.pos + 1) & self.mask;
        self.items[self.pos] = value;
        if self.count <= self.mask {
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
        if index > self.mask {
            return None;
        }
        Some(&self.items[self.slot(index)])
    }

    fn next_slot_mut(&mut self) -> &mut T {
        let next = (self.pos + 1) & self.mask;
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
        self.mask + 1
    }

    fn push_count(&self) -> u64 {
        self.push_count
    }
}

impl<T: Default + Clone + Send> std::ops::Index<usize> for FastRingBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(v) => v,
            None => panic!(
                "ring index {index} out of range for capacity {}",
                self.mask + 1
            ),
        }
    }
}
