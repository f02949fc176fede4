use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Executes `func` and captures any panic, translating that panic into a `Err` result.
/// Jobs only talk to the outside world through latches, so they are treated as
/// exception safe.
pub fn halt_unwinding<F, R>(func: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}

/// Extracts the message of a captured panic, if it carries one.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(v) = payload.downcast_ref::<&'static str>() {
        *v
    } else if let Some(v) = payload.downcast_ref::<String>() {
        v.as_str()
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn halt() {
        assert_eq!(halt_unwinding(|| 7).ok(), Some(7));

        let err = halt_unwinding(|| -> u32 { panic!("boom") }).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "boom");

        let err = halt_unwinding(|| -> u32 { panic!("code {}", 7) }).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "code 7");
    }
}
