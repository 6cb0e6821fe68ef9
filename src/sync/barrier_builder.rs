use smallvec::SmallVec;

use crate::gpu::driver::{ResourceKind, ResourceState};

/// Which part of a resource a transition barrier covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Subresource {
    All,
    Index(u32),
}

/// A pending synchronization command, generic over the backend's raw
/// resource identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Barrier<R> {
    Transition {
        resource: R,
        kind: ResourceKind,
        subresource: Subresource,
        before: ResourceState,
        after: ResourceState,
    },
    /// All unordered accesses to `resource` complete before any later one
    /// begins. No state changes.
    UnorderedAccess { resource: R },
    /// `before` and `after` share memory; work on `before` completes before
    /// `after` is used. `None` means "any resource".
    Aliasing { before: Option<R>, after: Option<R> },
}

impl<R> Barrier<R> {
    pub fn is_transition(&self) -> bool {
        matches!(self, Barrier::Transition { .. })
    }

    pub fn is_unordered_access(&self) -> bool {
        matches!(self, Barrier::UnorderedAccess { .. })
    }

    pub fn is_aliasing(&self) -> bool {
        matches!(self, Barrier::Aliasing { .. })
    }
}

/// Bounded accumulator of barriers for one command stream.
///
/// The batch never grows past its capacity: [`BarrierBatch::push`] reports
/// when it became full so the owner flushes before the next barrier.
#[derive(Debug)]
pub struct BarrierBatch<R> {
    pending: SmallVec<[Barrier<R>; 16]>,
    capacity: usize,
}

impl<R> BarrierBatch<R> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut pending = SmallVec::new();
        pending.reserve(capacity);
        Self { pending, capacity }
    }

    /// Returns true when the batch is now full and must be flushed.
    #[must_use]
    pub fn push(&mut self, barrier: Barrier<R>) -> bool {
        debug_assert!(self.pending.len() < self.capacity, "barrier batch overflow");
        self.pending.push(barrier);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[Barrier<R>] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Hand the batch to `emit` and clear it. Does nothing when empty.
    pub fn flush_with<F>(&mut self, emit: F) -> usize
    where
        F: FnOnce(&[Barrier<R>]),
    {
        if self.pending.is_empty() {
            return 0;
        }
        let count = self.pending.len();
        emit(&self.pending);
        self.pending.clear();
        count
    }
}
