use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_deque::{Injector, Steal};

use crate::errors::*;

use super::unwind;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A small pool of background threads for blocking I/O. Jobs are taken in FIFO order
/// by whatever worker has nothing to do; results are expected to be published through
/// a `LockLatch` that the owner thread polls.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

struct Shared {
    injector: Injector<Job>,
    watcher: Watcher,
    terminated: AtomicBool,
}

impl WorkerPool {
    /// Spawns `num` worker threads, at least one.
    pub fn new(num: u32) -> Result<Self> {
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
            terminated: AtomicBool::new(false),
        });

        let mut threads = Vec::new();
        for i in 0..num.max(1) {
            let sc = shared.clone();
            let t = thread::Builder::new()
                .name(format!("satchel-io-{}", i))
                .spawn(move || main_loop(&sc))
                .map_err(|err| format_err!("Failed to spawn I/O worker {}: {}", i, err))?;

            threads.push(t);
        }

        Ok(WorkerPool { shared, threads })
    }

    /// Push a job into the queue; it will be taken by whatever worker has nothing to do.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.injector.push(Box::new(func));
        self.shared.watcher.notify_one();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.terminated.store(true, Ordering::SeqCst);
        self.shared.watcher.notify_all();

        for t in self.threads.drain(..) {
            if t.join().is_err() {
                warn!("[WorkerPool] an I/O worker panicked.");
            }
        }
    }
}

fn main_loop(shared: &Shared) {
    let mut ms = 1;

    while !shared.terminated.load(Ordering::SeqCst) {
        match shared.injector.steal() {
            Steal::Success(job) => {
                if let Err(err) = unwind::halt_unwinding(job) {
                    warn!(
                        "[WorkerPool] job panicked: {}.",
                        unwind::panic_message(err.as_ref())
                    );
                }

                ms = 1;
            }
            Steal::Retry => {}
            Steal::Empty => {
                shared.watcher.wait_timeout(ms);
                ms = (ms * 2).min(48);
            }
        }
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, Duration::from_millis(ms));
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}
