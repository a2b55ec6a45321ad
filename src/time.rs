//! Monotonic time types used throughout the scheduler.
//!
//! `std::time::Duration` cannot represent a negative span, but the
//! scheduler needs exactly that to spell "no deadline" (see
//! [`Duration::no_deadline`]). `TimePoint` wraps [`std::time::Instant`]
//! so that subtracting two time points always produces a signed
//! `Duration` rather than panicking or saturating at zero.

use std::ops::{Add, Sub};
use std::time::Instant;

/// A signed nanosecond duration. Negative means "no deadline" wherever
/// this type is used as a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(i64);

impl Duration {
    /// A duration with no deadline: block forever.
    pub const fn no_deadline() -> Self {
        Duration(-1)
    }

    pub const fn zero() -> Self {
        Duration(0)
    }

    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Duration(millis * 1_000_000)
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Converts to whole milliseconds, rounding up so a sub-millisecond
    /// deadline never turns into a zero timeout unless it truly is
    /// zero. Clamped to `[1, 30_000]` when `self > 0`, per the
    /// selector's timeout-clamp contract; `0` maps to `0` (poll) and a
    /// negative value maps to `-1` (block forever).
    pub fn as_millis_clamped(self) -> i32 {
        if self.0 < 0 {
            -1
        } else if self.0 == 0 {
            0
        } else {
            let millis = (self.0 + 999_999) / 1_000_000;
            millis.clamp(1, 30_000) as i32
        }
    }

    pub fn from_std(d: std::time::Duration) -> Self {
        Duration(d.as_nanos().min(i64::MAX as u128) as i64)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Neg for Duration {
    type Output = Duration;
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

/// A point on the process's monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimePoint(Instant);

impl TimePoint {
    pub fn now() -> Self {
        TimePoint(Instant::now())
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;
    fn add(self, rhs: Duration) -> TimePoint {
        if rhs.0 >= 0 {
            TimePoint(self.0 + std::time::Duration::from_nanos(rhs.0 as u64))
        } else {
            TimePoint(self.0 - std::time::Duration::from_nanos((-rhs.0) as u64))
        }
    }
}

impl Sub for TimePoint {
    type Output = Duration;
    fn sub(self, rhs: TimePoint) -> Duration {
        match self.0.checked_duration_since(rhs.0) {
            Some(d) => Duration::from_std(d),
            None => -Duration::from_std(rhs.0.duration_since(self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_is_negative() {
        assert!(Duration::no_deadline().is_negative());
    }

    #[test]
    fn clamp_rounds_up_and_clamps() {
        assert_eq!(Duration::from_nanos(1).as_millis_clamped(), 1);
        assert_eq!(Duration::from_millis(30_001).as_millis_clamped(), 30_000);
        assert_eq!(Duration::zero().as_millis_clamped(), 0);
        assert_eq!(Duration::no_deadline().as_millis_clamped(), -1);
    }

    #[test]
    fn subtraction_can_be_negative() {
        let a = TimePoint::now();
        let b = a + Duration::from_millis(10);
        let diff = a - b;
        assert!(diff.is_negative());
        assert_eq!(-diff, b - a);
    }
}
