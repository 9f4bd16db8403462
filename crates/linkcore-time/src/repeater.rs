use crate::{Duration, Instant};

/// Fires at most once per `interval`, always firing on the very first check.
///
/// Used by the handshake timeout watchdog and by any periodic housekeeping
/// an executor thread performs between polls.
#[derive(Clone, Copy, Debug)]
pub struct Repeater {
    interval: Duration,
    last_acted: Option<Instant>,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: None }
    }

    /// Returns `true` at most once per `interval`; always `true` the first
    /// time it's called.
    #[inline]
    pub fn fired(&mut self) -> bool {
        match self.last_acted {
            None => {
                self.last_acted = Some(Instant::now());
                true
            }
            Some(last) if last.elapsed() >= self.interval => {
                self.last_acted = Some(Instant::now());
                true
            }
            Some(_) => false,
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last_acted = Some(Instant::now());
    }

    /// Forces the next [`Self::fired`] call to return `true`.
    pub fn force_fire(&mut self) {
        self.last_acted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_first_call_then_waits_out_interval() {
        let mut r = Repeater::every(Duration::from_secs(3600));
        assert!(r.fired());
        assert!(!r.fired());
    }

    #[test]
    fn force_fire_makes_next_call_fire() {
        let mut r = Repeater::every(Duration::from_secs(3600));
        assert!(r.fired());
        assert!(!r.fired());
        r.force_fire();
        assert!(r.fired());
    }
}
