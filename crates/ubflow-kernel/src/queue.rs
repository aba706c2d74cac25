//! On-chip buffer slots and the queues that hand them between pipeline stages.
//!
//! A [`PipelineQueue`] owns a fixed number of equally sized slots. A slot is
//! moved out of the queue by [`alloc`](PipelineQueue::alloc) (the producer
//! owns it), handed back with [`enque`](PipelineQueue::enque), moved out
//! again by [`deque`](PipelineQueue::deque) (the consumer owns it) and
//! finally returned with [`free`](PipelineQueue::free). Ownership transfer is
//! the move itself; there is no shared access to a slot.

use std::collections::VecDeque;

use crate::KernelError;

/// Number of slots per queue (double buffering).
pub const BUFFER_NUM: usize = 2;

// ---------------------------------------------------------------------------
// LocalTensor
// ---------------------------------------------------------------------------

/// One slot of on-chip memory holding up to `capacity` elements.
#[derive(Debug)]
pub struct LocalTensor<T> {
    data: Vec<T>,
    len: usize,
}

impl<T: Copy + Default> LocalTensor<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            len: 0,
        }
    }

    /// Maximum number of elements the slot can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the slot holds no valid elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Marks the first `len` elements valid.
    pub fn set_len(&mut self, len: usize) -> Result<(), KernelError> {
        if len > self.data.len() {
            return Err(KernelError::SlotOverflow {
                requested: len,
                capacity: self.data.len(),
            });
        }
        self.len = len;
        Ok(())
    }

    /// Copies `src` into the slot (`DataCopy` GM -> UB).
    pub fn copy_from(&mut self, src: &[T]) -> Result<(), KernelError> {
        self.set_len(src.len())?;
        self.data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Fills `len` elements with `value` (`Duplicate`).
    pub fn fill(&mut self, value: T, len: usize) -> Result<(), KernelError> {
        self.set_len(len)?;
        self.data[..len].fill(value);
        Ok(())
    }

    /// The valid elements.
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// The valid elements, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }
}

// ---------------------------------------------------------------------------
// PipelineQueue
// ---------------------------------------------------------------------------

/// A fixed set of slots cycled between a producer and a consumer stage.
#[derive(Debug)]
pub struct PipelineQueue<T> {
    free: Vec<LocalTensor<T>>,
    ready: VecDeque<LocalTensor<T>>,
    slots: usize,
}

impl<T: Copy + Default> PipelineQueue<T> {
    /// Creates a queue of `slots` slots, each holding `capacity` elements.
    pub fn new(slots: usize, capacity: usize) -> Self {
        Self {
            free: (0..slots).map(|_| LocalTensor::with_capacity(capacity)).collect(),
            ready: VecDeque::with_capacity(slots),
            slots,
        }
    }

    /// Creates a double-buffered queue.
    pub fn double_buffered(capacity: usize) -> Self {
        Self::new(BUFFER_NUM, capacity)
    }

    /// Takes a free slot for the producer.
    pub fn alloc(&mut self) -> Result<LocalTensor<T>, KernelError> {
        self.free
            .pop()
            .ok_or(KernelError::QueueExhausted { slots: self.slots })
    }

    /// Publishes a filled slot to the consumer.
    pub fn enque(&mut self, tensor: LocalTensor<T>) {
        self.ready.push_back(tensor);
    }

    /// Takes the oldest published slot.
    pub fn deque(&mut self) -> Result<LocalTensor<T>, KernelError> {
        self.ready.pop_front().ok_or(KernelError::QueueEmpty)
    }

    /// Returns a consumed slot to the free list.
    pub fn free(&mut self, mut tensor: LocalTensor<T>) {
        tensor.len = 0;
        self.free.push(tensor);
    }

    /// Slots currently allocated or published.
    pub fn in_flight(&self) -> usize {
        self.slots - self.free.len()
    }
}

// ---------------------------------------------------------------------------
// ScratchBuffer
// ---------------------------------------------------------------------------

/// Non-queued `f32` working area used for upcast arithmetic.
///
/// Split into one, two or three equally sized regions per tile.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    data: Vec<f32>,
}

impl ScratchBuffer {
    /// Reserves `capacity` floats up front.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
        }
    }

    fn reserve(&mut self, len: usize) {
        if self.data.len() < len {
            log::trace!("growing scratch buffer to {len} floats");
            self.data.resize(len, 0.0);
        }
    }

    /// One region of `len` floats.
    pub fn get(&mut self, len: usize) -> &mut [f32] {
        self.reserve(len);
        &mut self.data[..len]
    }

    /// Two disjoint regions of `len` floats.
    pub fn get2(&mut self, len: usize) -> (&mut [f32], &mut [f32]) {
        self.reserve(2 * len);
        let (a, rest) = self.data.split_at_mut(len);
        (a, &mut rest[..len])
    }

    /// Three disjoint regions of `len` floats.
    pub fn get3(&mut self, len: usize) -> (&mut [f32], &mut [f32], &mut [f32]) {
        self.reserve(3 * len);
        let (a, rest) = self.data.split_at_mut(len);
        let (b, rest) = rest.split_at_mut(len);
        (a, b, &mut rest[..len])
    }
}
