//! Legal-value ranges for tunable parameters

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// An inclusive set of legal values `start..=stop` on a grid of `step`.
///
/// A `step` of zero denotes a single discrete point (`start == stop`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    start: f64,
    stop: f64,
    step: f64,
}

impl Range {
    /// Build a range, rejecting anything that breaks the ordering invariants.
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "non-finite range ({start}, {stop}, {step})"
            )));
        }
        if start > stop || step < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "range start {start} stop {stop} step {step} is not monotonic"
            )));
        }
        if step == 0.0 && start != stop {
            return Err(Error::InvalidParameter(format!(
                "zero-step range must be a single point, got {start}..{stop}"
            )));
        }
        Ok(Self { start, stop, step })
    }

    /// A range holding exactly one value.
    pub fn point(value: f64) -> Self {
        Self {
            start: value,
            stop: value,
            step: 0.0,
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start && value <= self.stop
    }

    /// Clamp `value` into the range, optionally snapping to the step grid.
    pub fn clip(&self, value: f64, clip_step: bool) -> f64 {
        let clamped = value.clamp(self.start, self.stop);
        if !clip_step || self.step == 0.0 {
            return clamped;
        }
        let steps = ((clamped - self.start) / self.step).round();
        (self.start + steps * self.step).min(self.stop)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Start: {}, Stop: {}, Step: {}",
            self.start, self.stop, self.step
        )
    }
}

/// An ordered, non-overlapping union of [`Range`]s.
///
/// Devices describe most of their settings this way: sample rates are a
/// sequence of discrete points, gains a single stepped range, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaRange {
    ranges: Vec<Range>,
}

impl MetaRange {
    pub fn new(ranges: Vec<Range>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(Error::InvalidParameter("empty range list".to_string()));
        }
        for pair in ranges.windows(2) {
            if pair[1].start < pair[0].stop {
                return Err(Error::InvalidParameter(format!(
                    "ranges overlap or are unsorted: [{}] then [{}]",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { ranges })
    }

    pub fn single(range: Range) -> Self {
        Self {
            ranges: vec![range],
        }
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.ranges.iter()
    }

    /// Lowest legal value overall.
    pub fn start(&self) -> f64 {
        self.ranges[0].start
    }

    /// Highest legal value overall.
    pub fn stop(&self) -> f64 {
        self.ranges[self.ranges.len() - 1].stop
    }

    /// Finest spacing between legal values (zero for a single point).
    pub fn step(&self) -> f64 {
        let steps = self.ranges.iter().map(|r| r.step).filter(|s| *s > 0.0);
        let gaps = self
            .ranges
            .windows(2)
            .map(|pair| pair[1].start - pair[0].stop)
            .filter(|g| *g > 0.0);
        steps.chain(gaps).fold(0.0, |acc: f64, s| {
            if acc == 0.0 {
                s
            } else {
                acc.min(s)
            }
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start() && value <= self.stop()
    }

    /// Clamp `value` to the nearest legal value, optionally snapping to steps.
    pub fn clip(&self, value: f64, clip_step: bool) -> f64 {
        if value <= self.start() {
            return self.start();
        }
        if value >= self.stop() {
            return self.stop();
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if range.contains(value) {
                return range.clip(value, clip_step);
            }
            if let Some(next) = self.ranges.get(i + 1) {
                if value > range.stop && value < next.start {
                    return if value - range.stop <= next.start - value {
                        range.stop
                    } else {
                        next.start
                    };
                }
            }
        }
        value
    }
}

impl<'a> IntoIterator for &'a MetaRange {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl fmt::Display for MetaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_invariants() {
        assert!(Range::new(0.0, 10.0, 0.5).is_ok());
        assert!(Range::new(10.0, 0.0, 0.5).is_err());
        assert!(Range::new(0.0, 10.0, -1.0).is_err());
        assert!(Range::new(0.0, 10.0, 0.0).is_err());
        assert!(Range::new(f64::NAN, 10.0, 1.0).is_err());

        let p = Range::point(3.0);
        assert_eq!(p.start(), p.stop());
        assert_eq!(p.step(), 0.0);
    }

    #[test]
    fn test_range_clip() {
        let r = Range::new(0.0, 31.5, 0.5).unwrap();
        assert_eq!(r.clip(40.0, true), 31.5);
        assert_eq!(r.clip(-1.0, true), 0.0);
        assert_eq!(r.clip(10.3, true), 10.5);
        assert_eq!(r.clip(10.3, false), 10.3);
    }

    #[test]
    fn test_meta_range_of_points() {
        let rates = MetaRange::new(vec![
            Range::point(1e6),
            Range::point(2e6),
            Range::point(5e6),
        ])
        .unwrap();
        assert_eq!(rates.start(), 1e6);
        assert_eq!(rates.stop(), 5e6);
        assert_eq!(rates.step(), 1e6);
        assert_eq!(rates.clip(1.4e6, true), 1e6);
        assert_eq!(rates.clip(4.0e6, true), 5e6);
        assert_eq!(rates.clip(9e6, true), 5e6);
    }

    #[test]
    fn test_meta_range_rejects_overlap() {
        let a = Range::new(0.0, 10.0, 1.0).unwrap();
        let b = Range::new(5.0, 20.0, 1.0).unwrap();
        assert!(MetaRange::new(vec![a, b]).is_err());
        assert!(MetaRange::new(Vec::new()).is_err());
    }

    #[test]
    fn test_range_display() {
        let r = Range::new(1.0, 2.0, 0.5).unwrap();
        assert_eq!(r.to_string(), "Start: 1, Stop: 2, Step: 0.5");
    }
}
