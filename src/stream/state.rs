//! Per-channel acquisition state machine
//!
//! ```text
//! Idle --StartContinuous--> Continuous --StopContinuous--> Idle
//! Idle --NumSamps(N)------> Bounded(N) --N delivered-----> Idle
//! ```
//!
//! A `NumSampsAndMore` burst stays chained: a further bounded command
//! extends it without a restart, and running dry without one is a broken
//! chain.

use std::fmt;

use crate::types::StreamMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Continuous,
    Bounded { remaining: u64, chained: bool },
}

/// Effect of a stream command on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new burst begins.
    Armed,
    /// A chained bounded burst was extended in place.
    Extended,
    /// Acquisition stopped.
    Stopped,
    /// Nothing to do (stop while idle, zero-sample burst).
    Ignored,
}

/// Outcome of taking samples from an armed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Consumed {
    pub taken: u64,
    pub end_of_burst: bool,
    pub broken_chain: bool,
}

impl AcquisitionState {
    /// Apply a command, returning the new state and what changed.
    pub fn apply(self, mode: StreamMode, num_samps: u64) -> (Self, Transition) {
        match mode {
            StreamMode::StartContinuous => (Self::Continuous, Transition::Armed),
            StreamMode::StopContinuous => match self {
                Self::Idle => (Self::Idle, Transition::Ignored),
                _ => (Self::Idle, Transition::Stopped),
            },
            StreamMode::NumSampsAndDone | StreamMode::NumSampsAndMore => {
                let chained = mode == StreamMode::NumSampsAndMore;
                if num_samps == 0 {
                    return (self, Transition::Ignored);
                }
                match self {
                    Self::Bounded {
                        remaining,
                        chained: true,
                    } => (
                        Self::Bounded {
                            remaining: remaining.saturating_add(num_samps),
                            chained,
                        },
                        Transition::Extended,
                    ),
                    _ => (
                        Self::Bounded {
                            remaining: num_samps,
                            chained,
                        },
                        Transition::Armed,
                    ),
                }
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// How many of `wanted` samples the state still allows.
    pub fn allowance(&self, wanted: u64) -> u64 {
        match self {
            Self::Idle => 0,
            Self::Continuous => wanted,
            Self::Bounded { remaining, .. } => wanted.min(*remaining),
        }
    }

    /// Take up to `count` samples, moving to Idle when a bounded burst runs out.
    pub fn consume(&mut self, count: u64) -> Consumed {
        match *self {
            Self::Idle => Consumed::default(),
            Self::Continuous => Consumed {
                taken: count,
                ..Consumed::default()
            },
            Self::Bounded { remaining, chained } => {
                let taken = count.min(remaining);
                let left = remaining - taken;
                if left > 0 {
                    *self = Self::Bounded {
                        remaining: left,
                        chained,
                    };
                    return Consumed {
                        taken,
                        ..Consumed::default()
                    };
                }
                *self = Self::Idle;
                Consumed {
                    taken,
                    end_of_burst: !chained,
                    broken_chain: chained,
                }
            }
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Continuous => write!(f, "Armed(Continuous)"),
            Self::Bounded { remaining, chained } => {
                write!(f, "Armed(Bounded, remaining={remaining}")?;
                if *chained {
                    write!(f, ", chained")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_cycle() {
        let (state, t) = AcquisitionState::Idle.apply(StreamMode::StartContinuous, 0);
        assert_eq!(state, AcquisitionState::Continuous);
        assert_eq!(t, Transition::Armed);
        let (state, t) = state.apply(StreamMode::StopContinuous, 0);
        assert_eq!(state, AcquisitionState::Idle);
        assert_eq!(t, Transition::Stopped);
    }

    #[test]
    fn test_stop_while_idle_is_ignored() {
        let (state, t) = AcquisitionState::Idle.apply(StreamMode::StopContinuous, 0);
        assert_eq!(state, AcquisitionState::Idle);
        assert_eq!(t, Transition::Ignored);
    }

    #[test]
    fn test_bounded_exhausts_to_idle() {
        let (mut state, _) = AcquisitionState::Idle.apply(StreamMode::NumSampsAndDone, 100);
        assert_eq!(state.allowance(1000), 100);

        let first = state.consume(60);
        assert_eq!(first.taken, 60);
        assert!(!first.end_of_burst);

        let second = state.consume(60);
        assert_eq!(second.taken, 40);
        assert!(second.end_of_burst);
        assert!(!second.broken_chain);
        assert_eq!(state, AcquisitionState::Idle);
    }

    #[test]
    fn test_chained_burst_extends() {
        let (state, _) = AcquisitionState::Idle.apply(StreamMode::NumSampsAndMore, 100);
        let (mut state, t) = state.apply(StreamMode::NumSampsAndDone, 50);
        assert_eq!(t, Transition::Extended);
        assert_eq!(
            state,
            AcquisitionState::Bounded {
                remaining: 150,
                chained: false
            }
        );
        let done = state.consume(150);
        assert!(done.end_of_burst);
    }

    #[test]
    fn test_chain_without_follow_up_breaks() {
        let (mut state, _) = AcquisitionState::Idle.apply(StreamMode::NumSampsAndMore, 10);
        let out = state.consume(10);
        assert!(out.broken_chain);
        assert!(!out.end_of_burst);
        assert!(!state.is_armed());
    }

    #[test]
    fn test_zero_sample_burst_ignored() {
        let (state, t) = AcquisitionState::Idle.apply(StreamMode::NumSampsAndDone, 0);
        assert_eq!(state, AcquisitionState::Idle);
        assert_eq!(t, Transition::Ignored);
    }
}
