//! Background execution primitives. Nothing in here touches cache state, workers only
//! produce values that the owner thread picks up later.

pub mod latch;
pub mod unwind;
pub mod worker;

pub mod prelude {
    pub use super::latch::LockLatch;
    pub use super::worker::WorkerPool;
}
