//! Two-stage tuning requests and results

use std::fmt;

use serde::{Deserialize, Serialize};

/// How one tuning stage (RF or DSP) is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TunePolicy {
    /// Leave the stage where it is.
    None,
    /// Let the device pick a value that reaches the target.
    Auto,
    /// Use exactly the value given in the request.
    Manual,
}

impl fmt::Display for TunePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunePolicy::None => "None",
            TunePolicy::Auto => "Auto",
            TunePolicy::Manual => "Manual",
        };
        f.write_str(s)
    }
}

/// A request to tune a channel to `target_freq_hz` through the RF
/// (analog LO) and DSP (digital down-conversion) stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneRequest {
    pub target_freq_hz: f64,
    pub rf_freq_policy: TunePolicy,
    pub rf_freq_hz: f64,
    pub dsp_freq_policy: TunePolicy,
    pub dsp_freq_hz: f64,
}

impl TuneRequest {
    /// Both stages on auto.
    pub fn new(target_freq_hz: f64) -> Self {
        Self {
            target_freq_hz,
            rf_freq_policy: TunePolicy::Auto,
            rf_freq_hz: 0.0,
            dsp_freq_policy: TunePolicy::Auto,
            dsp_freq_hz: 0.0,
        }
    }

    /// Pin the LO at `target + lo_offset` and let the DSP stage make up the
    /// difference, keeping the LO leakage spur away from the signal of interest.
    pub fn with_lo_offset(target_freq_hz: f64, lo_offset_hz: f64) -> Self {
        Self {
            target_freq_hz,
            rf_freq_policy: TunePolicy::Manual,
            rf_freq_hz: target_freq_hz + lo_offset_hz,
            dsp_freq_policy: TunePolicy::Auto,
            dsp_freq_hz: 0.0,
        }
    }
}

impl fmt::Display for TuneRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TargetFreqHz: {}, RfFreqPolicy: {}, RfFreqHz: {}, DspFreqPolicy: {}, DspFreqHz: {}",
            self.target_freq_hz,
            self.rf_freq_policy,
            self.rf_freq_hz,
            self.dsp_freq_policy,
            self.dsp_freq_hz
        )
    }
}

/// What the device actually set for each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TuneResult {
    pub target_rf_freq_hz: f64,
    pub actual_rf_freq_hz: f64,
    pub target_dsp_freq_hz: f64,
    pub actual_dsp_freq_hz: f64,
}

impl TuneResult {
    /// Whether each stage landed within `ratio_tolerance` of its target.
    ///
    /// A stage with a zero target counts as settled when its actual is zero too.
    pub fn settled(&self, ratio_tolerance: f64) -> bool {
        let close = |target: f64, actual: f64| {
            if target == 0.0 {
                actual == 0.0
            } else {
                ((actual / target) - 1.0).abs() < ratio_tolerance
            }
        };
        close(self.target_rf_freq_hz, self.actual_rf_freq_hz)
            || close(self.target_dsp_freq_hz, self.actual_dsp_freq_hz)
    }
}

impl fmt::Display for TuneResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TargetRfFreqHz: {}, ActualRfFreqHz: {}, TargetDspFreqHz: {}, ActualDspFreqHz: {}",
            self.target_rf_freq_hz,
            self.actual_rf_freq_hz,
            self.target_dsp_freq_hz,
            self.actual_dsp_freq_hz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_request() {
        let req = TuneRequest::new(915e6);
        assert_eq!(req.rf_freq_policy, TunePolicy::Auto);
        assert_eq!(req.dsp_freq_policy, TunePolicy::Auto);
    }

    #[test]
    fn test_lo_offset_request() {
        for (target, offset) in [(2.4e9, 1e6), (100e6, -250e3), (5.8e9, 0.0)] {
            let req = TuneRequest::with_lo_offset(target, offset);
            assert_eq!(req.rf_freq_policy, TunePolicy::Manual);
            assert_eq!(req.rf_freq_hz, target + offset);
            assert_eq!(req.dsp_freq_policy, TunePolicy::Auto);
            assert_eq!(req.target_freq_hz, target);
        }
    }

    #[test]
    fn test_settled() {
        let result = TuneResult {
            target_rf_freq_hz: 1e9,
            actual_rf_freq_hz: 1e9 + 500.0,
            target_dsp_freq_hz: 0.0,
            actual_dsp_freq_hz: 0.0,
        };
        assert!(result.settled(1e-4));

        let off = TuneResult {
            target_rf_freq_hz: 1e9,
            actual_rf_freq_hz: 1.1e9,
            target_dsp_freq_hz: 2e6,
            actual_dsp_freq_hz: 3e6,
        };
        assert!(!off.settled(1e-4));
    }
}
