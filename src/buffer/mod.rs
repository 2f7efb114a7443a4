//! Fixed-capacity circular buffers with overwrite-oldest semantics
//!
//! Two variants share one contract ([`SlotRing`]): [`RingBuffer`] accepts any
//! capacity and wraps with modulo arithmetic, [`FastRingBuffer`] rounds the
//! capacity up to a power of two and wraps with a bitmask.
//!
//! Logical index 0 is the newest element, `capacity() - 1` the oldest slot.
//! Only the first `len()` logical indices hold live values; the rest keep
//! whatever stale value last occupied the slot.

pub mod fast_ring;
pub mod ring;

pub use fast_ring::FastRingBuffer;
pub use ring::RingBuffer;

/// Operations shared by both ring buffer variants.
pub trait SlotRing<T: Default + Clone>: Send {
    /// Allocate a ring holding at least `min_size` slots.
    ///
    /// # Panics
    ///
    /// Panics if `min_size` is zero.
    fn with_min_size(min_size: usize) -> Self
    where
        Self: Sized;

    /// Push a value as the newest element, overwriting the oldest once full.
    fn push(&mut self, value: T);

    /// Remove and return the oldest element, or `T::default()` when empty.
    fn pop(&mut self) -> T;

    /// Raw slot at logical `index` (0 = newest), live or stale.
    fn get(&self, index: usize) -> Option<&T>;

    /// Mutable access to the slot the next `push` will overwrite.
    fn next_slot_mut(&mut self) -> &mut T;

    /// Drop all content and reallocate with at least `min_size` slots.
    fn resize(&mut self, min_size: usize);

    /// Forget all live elements without touching slot contents.
    fn clear(&mut self);

    /// Number of live elements.
    fn len(&self) -> usize;

    /// Number of slots.
    fn capacity(&self) -> usize;

    /// Total pushes since the last resize.
    fn push_count(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Newest element, or `T::default()` when empty.
    fn first(&self) -> T {
        if self.is_empty() {
            return T::default();
        }
        self.get(0).cloned().unwrap_or_default()
    }

    /// Oldest live element, or `T::default()` when empty.
    fn last(&self) -> T {
        if self.is_empty() {
            return T::default();
        }
        self.get(self.len() - 1).cloned().unwrap_or_default()
    }

    /// Up to `max_count` of the oldest live elements, oldest first.
    fn to_vec(&self, max_count: usize) -> Vec<T> {
        let len = self.len();
        let n = max_count.min(len);
        (len - n..len)
            .rev()
            .filter_map(|i| self.get(i).cloned())
            .collect()
    }

    /// Remove the slot the next `push` will overwrite, leaving a default in
    /// its place.
    fn take_next_slot(&mut self) -> T {
        std::mem::take(self.next_slot_mut())
    }
}

/// Ring variant picked at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyRing<T> {
    General(RingBuffer<T>),
    Fast(FastRingBuffer<T>),
}

impl<T: Default> AnyRing<T> {
    pub fn new(min_size: usize, fast: bool) -> Self {
        if fast {
            AnyRing::Fast(FastRingBuffer::new(min_size))
        } else {
            AnyRing::General(RingBuffer::new(min_size))
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, AnyRing::Fast(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $ring:ident => $body:expr) => {
        match $self {
            AnyRing::General($ring) => $body,
            AnyRing::Fast($ring) => $body,
        }
    };
}

impl<T: Default + Clone + Send> SlotRing<T> for AnyRing<T> {
    fn with_min_size(min_size: usize) -> Self {
        AnyRing::General(RingBuffer::new(min_size))
    }

    fn push(&mut self, value: T) {
        dispatch!(self, ring => ring.push(value))
    }

    fn pop(&mut self) -> T {
        dispatch!(self, ring => ring.pop())
    }

    fn get(&self, index: usize) -> Option<&T> {
        dispatch!(self, ring => ring.get(index))
    }

    fn next_slot_mut(&mut self) -> &mut T {
        dispatch!(self, ring => ring.next_slot_mut())
    }

    fn resize(&mut self, min_size: usize) {
        dispatch!(self, ring => ring.resize(min_size))
    }

    fn clear(&mut self) {
        dispatch!(self, ring => ring.clear())
    }

    fn len(&self) -> usize {
        dispatch!(self, ring => ring.len())
    }

    fn capacity(&self) -> usize {
        dispatch!(self, ring => ring.capacity())
    }

    fn push_count(&self) -> u64 {
        dispatch!(self, ring => ring.push_count())
    }
}
