use std::time::{Duration, Instant};

/// Busy-polls `cond` until it returns `true` or `timeout` elapses. Returns
/// whether `cond` was satisfied.
pub fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
