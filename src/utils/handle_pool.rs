use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

use super::handle::{HandleIndex, HandleLike};

/// `HandlePool` manages the manipulations of a `Handle` collection, which are
/// created with a continuous `index` field. It also have the ability to find
/// out the current status of a specified `Handle`.
///
/// An odd version marks a slot as alive, freeing a slot bumps its version to the next
/// even number so every outstanding handle to it turns stale.
pub struct HandlePool<H: HandleLike> {
    versions: Vec<HandleIndex>,
    frees: BinaryHeap<Reverse<HandleIndex>>,
    _phantom: PhantomData<H>,
}

impl<H: HandleLike> Default for HandlePool<H> {
    fn default() -> Self {
        HandlePool::new()
    }
}

impl<H: HandleLike> HandlePool<H> {
    /// Constructs a new, empty `HandlePool`.
    pub fn new() -> Self {
        HandlePool {
            versions: Vec::new(),
            frees: BinaryHeap::new(),
            _phantom: PhantomData,
        }
    }

    /// Creates a unused `Handle`. Lower indices are recycled first.
    pub fn create(&mut self) -> H {
        if let Some(Reverse(index)) = self.frees.pop() {
            let version = &mut self.versions[index as usize];
            *version += 1;
            H::new(index, *version)
        } else {
            self.versions.push(1);
            H::new(self.versions.len() as HandleIndex - 1, 1)
        }
    }

    /// Returns true if this `Handle` was created by `HandlePool`, and has not been
    /// freed yet.
    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.versions
            .get(handle.index() as usize)
            .map(|&version| version & 0x1 == 1 && version == handle.version())
            .unwrap_or(false)
    }

    /// Recycles the `Handle` index, and mark its version as dead.
    pub fn free(&mut self, handle: H) -> bool {
        if !self.contains(handle) {
            return false;
        }

        self.versions[handle.index() as usize] += 1;
        self.frees.push(Reverse(handle.index()));
        true
    }

    /// Returns the total number of alive handle in this `HandlePool`.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len() - self.frees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::super::handle::Handle;
    use super::*;

    #[test]
    fn index_reuse() {
        let mut set: HandlePool<Handle> = HandlePool::new();
        let e1 = set.create();
        let e2 = set.create();
        assert_eq!(set.len(), 2);

        assert!(set.free(e1));
        assert!(!set.free(e1));
        assert!(!set.contains(e1));
        assert!(set.contains(e2));

        let e3 = set.create();
        assert_eq!(e3.index(), e1.index());
        assert_ne!(e3.version(), e1.version());
        assert!(!set.contains(e1));
        assert!(set.contains(e3));
    }
}
