use crate::Duration;

/// Monotonic instant, wrapping [`std::time::Instant`].
///
/// Unlike [`crate::Nanos`] this is only meaningful for measuring elapsed
/// time on the local machine; it carries no relation to wall-clock time.
#[derive(Clone, Copy, Debug)]
pub struct Instant(std::time::Instant);

impl Instant {
    #[inline]
    pub fn now() -> Self {
        Instant(std::time::Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        Duration(self.0.elapsed())
    }
}

impl Default for Instant {
    fn default() -> Self {
        Instant::now()
    }
}
