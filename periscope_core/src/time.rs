// Copyright 2026 the Periscope Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time and timebase conversion.
//!
//! [`HostTime`] is a point in time in host-native monotonic ticks (on the web,
//! microseconds derived from `performance.now()`). [`Duration`] uses the same
//! tick units. [`Timebase`] carries the rational ticks-to-nanoseconds factor so
//! that configuration expressed in milliseconds can be converted to ticks, and
//! measured costs can be reported in milliseconds.

use core::fmt;
use core::ops::{Add, Sub};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// A point in time expressed as host-native monotonic ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Adds a duration, saturating at the end of the tick range.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Rational conversion factor from ticks to nanoseconds.
///
/// `nanoseconds = ticks * numer / denom`
///
/// The web host runs at one tick per microsecond (`1000/1`); simulated hosts
/// usually use [`Timebase::MICROS`] as well so that recorded traces line up.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator of the ticks-to-nanoseconds ratio.
    pub numer: u32,
    /// Denominator of the ticks-to-nanoseconds ratio.
    pub denom: u32,
}

impl Timebase {
    /// A timebase where ticks are already nanoseconds (1:1).
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// A timebase where one tick is one microsecond.
    pub const MICROS: Self = Self {
        numer: 1000,
        denom: 1,
    };

    /// Creates a new timebase with the given numerator and denominator.
    ///
    /// # Panics
    ///
    /// Panics if `denom` or `numer` is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "timebase denominator must not be zero");
        assert!(numer != 0, "timebase numerator must not be zero");
        Self { numer, denom }
    }

    /// Converts a tick count to nanoseconds.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        let wide = ticks as u128 * self.numer as u128 / self.denom as u128;
        wide as u64
    }

    /// Converts nanoseconds to a tick count.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn nanos_to_ticks(self, nanos: u64) -> u64 {
        let wide = nanos as u128 * self.denom as u128 / self.numer as u128;
        wide as u64
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

/// A duration in host-native ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Creates a duration from whole milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64, timebase: Timebase) -> Self {
        Self(timebase.nanos_to_ticks(millis.saturating_mul(NANOS_PER_MILLI)))
    }

    /// Creates a duration from microseconds.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: u64, timebase: Timebase) -> Self {
        Self(timebase.nanos_to_ticks(micros.saturating_mul(1000)))
    }

    /// Returns this duration in fractional milliseconds.
    #[inline]
    #[must_use]
    pub fn as_millis_f64(self, timebase: Timebase) -> f64 {
        timebase.ticks_to_nanos(self.0) as f64 / NANOS_PER_MILLI as f64
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_in_micro_timebase() {
        let d = Duration::from_millis(88, Timebase::MICROS);
        assert_eq!(d.ticks(), 88_000, "88ms at 1µs per tick");
        assert!(
            (d.as_millis_f64(Timebase::MICROS) - 88.0).abs() < f64::EPSILON,
            "round trip back to milliseconds"
        );
    }

    #[test]
    fn millis_in_nano_timebase() {
        let d = Duration::from_millis(16, Timebase::NANOS);
        assert_eq!(d.ticks(), 16_000_000);
    }

    #[test]
    fn fractional_millis_from_ticks() {
        let d = Duration(1_500);
        assert!((d.as_millis_f64(Timebase::MICROS) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn overflow_safe_conversion() {
        let tb = Timebase::new(125, 3);
        // Should not panic; result is approximate but deterministic.
        let _nanos = tb.ticks_to_nanos(u64::MAX / 2);
    }

    #[test]
    fn host_time_duration_ops() {
        let t = HostTime(1000);
        let d = Duration(200);
        assert_eq!((t + d).ticks(), 1200);
        assert_eq!(t - HostTime(400), Duration(600));
        assert_eq!(t.saturating_duration_since(HostTime(1500)), Duration::ZERO);
        assert_eq!(HostTime(u64::MAX).saturating_add(d), HostTime(u64::MAX));
    }
}
