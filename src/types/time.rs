//! Absolute device-clock timestamps

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Absolute device-clock time: whole seconds plus a fractional part.
///
/// The fractional part is always kept in `[0, 1)`; every constructor and
/// arithmetic helper carries overflow into the whole seconds and clamps
/// times before the epoch to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeSpec {
    full_secs: u64,
    frac_secs: f64,
}

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec {
        full_secs: 0,
        frac_secs: 0.0,
    };

    /// Build a time, normalising the fractional part into `[0, 1)`.
    pub fn new(full_secs: u64, frac_secs: f64) -> Self {
        Self::normalise(full_secs as i128, frac_secs)
    }

    /// Build a time from a (possibly fractional) number of seconds.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self::normalise(0, secs)
    }

    /// Convert a host wall-clock reading into a device time.
    pub fn from_system_time(time: DateTime<Utc>) -> Self {
        let secs = time.timestamp();
        if secs < 0 {
            return Self::ZERO;
        }
        Self::new(secs as u64, time.timestamp_subsec_nanos() as f64 / 1e9)
    }

    /// Current host time, as read at the call boundary.
    pub fn host_now() -> Self {
        Self::from_system_time(Utc::now())
    }

    pub fn full_secs(&self) -> u64 {
        self.full_secs
    }

    pub fn frac_secs(&self) -> f64 {
        self.frac_secs
    }

    /// Total seconds as a float. Loses sub-microsecond precision for large times.
    pub fn as_secs_f64(&self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }

    /// Offset this time by `secs` (which may be negative).
    pub fn add_secs(&self, secs: f64) -> Self {
        Self::normalise(self.full_secs as i128, self.frac_secs + secs)
    }

    /// Signed number of seconds from `earlier` to `self`.
    ///
    /// Whole and fractional parts are differenced separately so that large
    /// absolute times keep full resolution.
    pub fn secs_since(&self, earlier: &TimeSpec) -> f64 {
        let whole = self.full_secs as i128 - earlier.full_secs as i128;
        whole as f64 + (self.frac_secs - earlier.frac_secs)
    }

    /// Number of ticks of a clock running at `rate` Hz since time zero.
    pub fn to_ticks(&self, rate: f64) -> i128 {
        let whole_rate = rate.trunc();
        let whole_ticks = self.full_secs as i128 * whole_rate as i128;
        let rest = self.full_secs as f64 * (rate - whole_rate) + self.frac_secs * rate;
        whole_ticks + rest.round() as i128
    }

    fn normalise(full: i128, frac: f64) -> Self {
        if !frac.is_finite() {
            return Self::new(full.max(0) as u64, 0.0);
        }
        let carry = frac.floor();
        let mut full = full + carry as i128;
        let mut frac = frac - carry;
        // floating error can land exactly on 1.0 after the subtraction
        if frac >= 1.0 {
            full += 1;
            frac = 0.0;
        }
        if full < 0 {
            return Self::ZERO;
        }
        Self {
            full_secs: full.min(u64::MAX as i128) as u64,
            frac_secs: frac,
        }
    }
}

impl PartialOrd for TimeSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.full_secs.cmp(&other.full_secs) {
            Ordering::Equal => self.frac_secs.partial_cmp(&other.frac_secs),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = ((self.frac_secs * 1e9).round() as u64).min(999_999_999);
        write!(f, "{}.{:09}s", self.full_secs, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_carries_fraction() {
        let t = TimeSpec::new(10, 2.25);
        assert_eq!(t.full_secs(), 12);
        assert!((t.frac_secs() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_negative_fraction_borrows() {
        let t = TimeSpec::new(5, -0.5);
        assert_eq!(t.full_secs(), 4);
        assert!((t.frac_secs() - 0.5).abs() < 1e-12);

        // before the epoch clamps to zero
        assert_eq!(TimeSpec::new(0, -3.0), TimeSpec::ZERO);
    }

    #[test]
    fn test_add_secs_and_secs_since() {
        let start = TimeSpec::new(1_700_000_000, 0.75);
        let later = start.add_secs(0.5);
        assert_eq!(later.full_secs(), 1_700_000_001);
        assert!((later.frac_secs() - 0.25).abs() < 1e-9);
        assert!((later.secs_since(&start) - 0.5).abs() < 1e-9);
        assert!((start.secs_since(&later) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ordering() {
        let a = TimeSpec::new(3, 0.9);
        let b = TimeSpec::new(4, 0.1);
        assert!(a < b);
        assert!(b > a);
        assert!(TimeSpec::new(4, 0.1) <= b);
    }

    #[test]
    fn test_to_ticks() {
        let t = TimeSpec::new(2, 0.5);
        assert_eq!(t.to_ticks(100e6), 250_000_000);
        // large absolute times keep tick resolution
        let big = TimeSpec::new(1_700_000_000, 0.00000001);
        assert_eq!(big.to_ticks(100e6), 170_000_000_000_000_001);
    }

    #[test]
    fn test_from_system_time() {
        let time = Utc.timestamp_opt(1_600_000_000, 250_000_000).unwrap();
        let t = TimeSpec::from_system_time(time);
        assert_eq!(t.full_secs(), 1_600_000_000);
        assert!((t.frac_secs() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        assert_eq!(TimeSpec::new(7, 0.5).to_string(), "7.500000000s");
    }
}
