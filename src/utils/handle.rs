use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Generational handle used by headless backends to name native objects.
pub struct Handle<T> {
    pub slot: u16,
    pub generation: u16,
    phantom: PhantomData<T>,
}

impl<T> Handle<T> {
    pub fn new(slot: u16, generation: u16) -> Self {
        Self {
            slot,
            generation,
            phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot, self.generation)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Hands out handles with increasing slots, bumping the generation when the
/// slot space wraps.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u16,
    generation: u16,
}

impl HandleAllocator {
    pub fn allocate<T>(&mut self) -> Handle<T> {
        let handle = Handle::new(self.next, self.generation);
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.generation = self.generation.wrapping_add(1);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag;

    #[test]
    fn handles_compare_by_slot_and_generation() {
        let a = Handle::<Tag>::new(3, 1);
        let b = Handle::<Tag>::new(3, 1);
        let c = Handle::<Tag>::new(3, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn allocator_hands_out_distinct_handles() {
        let mut alloc = HandleAllocator::default();
        let a: Handle<Tag> = alloc.allocate();
        let b: Handle<Tag> = alloc.allocate();
        assert_ne!(a, b);
        assert_eq!(b.slot, a.slot + 1);
    }
}
