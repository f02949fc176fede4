use std::sync::{Condvar, Mutex};

/// A Latch starts as empty and is eventually filled with a value by some producer,
/// usually a background worker. The consumer could test it without blocking, or block
/// until it becomes set.
pub struct LockLatch<T> {
    m: Mutex<Option<T>>,
    v: Condvar,
}

impl<T> Default for LockLatch<T> {
    fn default() -> Self {
        LockLatch::new()
    }
}

impl<T> LockLatch<T> {
    #[inline]
    pub fn new() -> Self {
        LockLatch {
            m: Mutex::new(None),
            v: Condvar::new(),
        }
    }

    /// Set the latch, signalling others. Setting a latch twice replaces the value.
    pub fn set(&self, value: T) {
        let mut guard = self.m.lock().unwrap();
        *guard = Some(value);
        self.v.notify_all();
    }

    /// Test if the latch is set.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.m.lock().unwrap().is_some()
    }

    /// Takes the value out of the latch if it has been set.
    #[inline]
    pub fn try_take(&self) -> Option<T> {
        self.m.lock().unwrap().take()
    }

    /// Block until latch is set, and takes the value out of it.
    pub fn wait(&self) -> T {
        let mut guard = self.m.lock().unwrap();
        loop {
            if let Some(value) = guard.take() {
                return value;
            }

            guard = self.v.wait(guard).unwrap();
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn basic() {
        let latch = LockLatch::new();
        assert!(!latch.is_set());
        assert_eq!(latch.try_take(), None);

        latch.set(3);
        assert!(latch.is_set());
        assert_eq!(latch.try_take(), Some(3));
        assert!(!latch.is_set());
    }

    #[test]
    fn wait() {
        let latch = Arc::new(LockLatch::new());
        let tx = latch.clone();
        let t = thread::spawn(move || tx.set("done"));

        assert_eq!(latch.wait(), "done");
        t.join().unwrap();
    }
}
