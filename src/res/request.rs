//! A asynchronous loading request.

use std::sync::Arc;

use crate::sched::prelude::LockLatch;

/// A asynchronous loading request. You sould checks the completion status with
/// `poll` method manually. Once the polling returns true, you could fetch the
/// result by `response`.
pub enum Request<T> {
    NotReady(Arc<LockLatch<T>>),
    Ok(T),
}

impl<T> Request<T> {
    #[inline]
    pub fn latch() -> Arc<LockLatch<T>> {
        Arc::new(LockLatch::new())
    }

    #[inline]
    pub fn new(latch: Arc<LockLatch<T>>) -> Self {
        Request::NotReady(latch)
    }

    /// Creates a request which is resolved already.
    #[inline]
    pub fn ok(value: T) -> Self {
        Request::Ok(value)
    }

    /// Attempt to resolve the request to a final state, and returns true if the
    /// loading result is ready for user.
    pub fn poll(&mut self) -> bool {
        let rsp = match *self {
            Request::Ok(_) => return true,
            Request::NotReady(ref latch) => match latch.try_take() {
                Some(rsp) => rsp,
                None => return false,
            },
        };

        *self = Request::Ok(rsp);
        true
    }

    /// Return the response if exists.
    #[inline]
    pub fn response(&self) -> Option<&T> {
        if let Request::Ok(ref rsp) = *self {
            Some(rsp)
        } else {
            None
        }
    }

    /// Consumes the request and returns the response if exists.
    #[inline]
    pub fn into_response(self) -> Option<T> {
        match self {
            Request::Ok(rsp) => Some(rsp),
            _ => None,
        }
    }
}
