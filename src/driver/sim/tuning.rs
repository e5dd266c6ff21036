//! Two-stage tune negotiation
//!
//! The delivered centre frequency is `rf + dsp`. Each stage is resolved
//! on its own policy; the DSP stage on auto absorbs whatever the RF stage
//! could not reach.

use crate::error::{Error, Result};
use crate::types::{Range, TunePolicy, TuneRequest, TuneResult};

/// Tolerance for treating a pinned LO value as on-grid.
const GRID_TOLERANCE_HZ: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub(super) struct TuneLimits {
    pub rf: Range,
    pub dsp: Range,
}

/// Resolve `request` against the current stage settings.
pub(super) fn negotiate(
    request: &TuneRequest,
    current_rf: f64,
    current_dsp: f64,
    limits: &TuneLimits,
) -> Result<TuneResult> {
    if !request.target_freq_hz.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "tune target {} is not finite",
            request.target_freq_hz
        )));
    }

    let (target_rf, actual_rf) = match request.rf_freq_policy {
        TunePolicy::None => (current_rf, current_rf),
        TunePolicy::Auto => (
            request.target_freq_hz,
            limits.rf.clip(request.target_freq_hz, true),
        ),
        TunePolicy::Manual => {
            let rf = request.rf_freq_hz;
            if !limits.rf.contains(rf) {
                return Err(Error::TuneRejected(format!(
                    "manual LO {rf} Hz outside [{}, {}]",
                    limits.rf.start(),
                    limits.rf.stop()
                )));
            }
            let snapped = limits.rf.clip(rf, true);
            if (snapped - rf).abs() > GRID_TOLERANCE_HZ {
                return Err(Error::TuneRejected(format!(
                    "manual LO {rf} Hz is off the {} Hz synthesizer grid",
                    limits.rf.step()
                )));
            }
            (rf, snapped)
        }
    };

    let (target_dsp, actual_dsp) = match request.dsp_freq_policy {
        TunePolicy::None => (current_dsp, current_dsp),
        TunePolicy::Auto => {
            let wanted = request.target_freq_hz - actual_rf;
            (wanted, limits.dsp.clip(wanted, true))
        }
        TunePolicy::Manual => {
            let dsp = request.dsp_freq_hz;
            if !limits.dsp.contains(dsp) {
                return Err(Error::TuneRejected(format!(
                    "manual DSP shift {dsp} Hz outside [{}, {}]",
                    limits.dsp.start(),
                    limits.dsp.stop()
                )));
            }
            (dsp, limits.dsp.clip(dsp, true))
        }
    };

    Ok(TuneResult {
        target_rf_freq_hz: target_rf,
        actual_rf_freq_hz: actual_rf,
        target_dsp_freq_hz: target_dsp,
        actual_dsp_freq_hz: actual_dsp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sim::frontend::{dsp_range, rf_range};

    fn limits() -> TuneLimits {
        TuneLimits {
            rf: rf_range(),
            dsp: dsp_range(),
        }
    }

    #[test]
    fn test_auto_auto_lands_within_resolution() {
        let request = TuneRequest::new(2_400_000_123.456);
        let result = negotiate(&request, 1e9, 0.0, &limits()).unwrap();
        let total = result.actual_rf_freq_hz + result.actual_dsp_freq_hz;
        let resolution = limits().rf.step().max(limits().dsp.step());
        assert!((total - request.target_freq_hz).abs() <= resolution);
        assert_eq!(result.actual_rf_freq_hz % 1e3, 0.0);
    }

    #[test]
    fn test_lo_offset_request() {
        let request = TuneRequest::with_lo_offset(915e6, 2e6);
        let result = negotiate(&request, 1e9, 0.0, &limits()).unwrap();
        assert_eq!(result.actual_rf_freq_hz, 917e6);
        assert!((result.actual_dsp_freq_hz + 2e6).abs() < 0.05);
    }

    #[test]
    fn test_manual_off_grid_rejected() {
        let mut request = TuneRequest::new(915e6);
        request.rf_freq_policy = TunePolicy::Manual;
        request.rf_freq_hz = 915_000_500.0;
        assert!(matches!(
            negotiate(&request, 1e9, 0.0, &limits()),
            Err(Error::TuneRejected(_))
        ));
    }

    #[test]
    fn test_manual_out_of_range_rejected() {
        let request = TuneRequest::with_lo_offset(6e9, 10e6);
        assert!(matches!(
            negotiate(&request, 1e9, 0.0, &limits()),
            Err(Error::TuneRejected(_))
        ));
    }

    #[test]
    fn test_none_policies_keep_current() {
        let mut request = TuneRequest::new(433.92e6);
        request.rf_freq_policy = TunePolicy::None;
        request.dsp_freq_policy = TunePolicy::None;
        let result = negotiate(&request, 430e6, 1e6, &limits()).unwrap();
        assert_eq!(result.actual_rf_freq_hz, 430e6);
        assert_eq!(result.actual_dsp_freq_hz, 1e6);
    }

    #[test]
    fn test_auto_beyond_lo_range_uses_dsp() {
        let request = TuneRequest::new(30e6);
        let result = negotiate(&request, 1e9, 0.0, &limits()).unwrap();
        assert_eq!(result.actual_rf_freq_hz, 50e6);
        assert!((result.actual_dsp_freq_hz + 20e6).abs() < 0.05);
    }
}
