use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, good till 2554 or so.
///
/// Used for handshake nonces and for wall-clock timestamps in logs.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Nanos(pub u64);

impl Nanos {
    pub const ZERO: Nanos = Nanos(0);
    pub const MAX: Nanos = Nanos(u64::MAX);

    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Nanos(s * 1_000_000_000)
    }

    #[inline]
    pub const fn from_millis(s: u64) -> Self {
        Nanos(s * 1_000_000)
    }

    #[inline]
    pub const fn from_micros(s: u64) -> Self {
        Nanos(s * 1_000)
    }

    /// Current wall-clock time. Not monotonic — do not use for measuring
    /// elapsed durations, use [`crate::Instant`] for that.
    #[inline]
    pub fn now() -> Self {
        let since_epoch =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Nanos(since_epoch.as_nanos() as u64)
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Nanos) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl From<u64> for Nanos {
    #[inline]
    fn from(value: u64) -> Self {
        Nanos(value)
    }
}

impl From<Nanos> for u64 {
    #[inline]
    fn from(value: Nanos) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_plausible() {
        // Some time after 2020-01-01T00:00:00Z.
        assert!(Nanos::now() > Nanos::from_secs(1_577_836_800));
    }

    #[test]
    fn saturating_sub_never_wraps() {
        assert_eq!(Nanos(1).saturating_sub(Nanos(5)), Nanos::ZERO);
    }
}
