//! Receive front-end model: ranges, gain staging, sensors and per-channel
//! stream bookkeeping.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::stream::AcquisitionState;
use crate::types::{MetaRange, Range, RxErrorCode, SensorValue, SubDevSpecPair, TimeSpec};

pub(super) const MASTER_CLOCK_HZ: f64 = 100e6;
pub(super) const RF_START_HZ: f64 = 50e6;
pub(super) const RF_STOP_HZ: f64 = 6e9;
pub(super) const LO_STEP_HZ: f64 = 1e3;
const BW_START_HZ: f64 = 200e3;
const BW_STOP_HZ: f64 = 56e6;
const MAX_DECIMATION: u32 = 512;

pub(super) const ANTENNAS: [&str; 2] = ["RX2", "TX/RX"];
const LNA: &str = "LNA";
const PGA: &str = "PGA";
const LNA_MAX_DB: f64 = 20.0;
const LNA_STEP_DB: f64 = 10.0;
const PGA_MAX_DB: f64 = 31.5;
const PGA_STEP_DB: f64 = 0.5;

/// Sub-devices fitted in each board's single daughterboard slot.
pub(super) const SLOT: &str = "A";
pub(super) const SUBDEVS: [&str; 2] = ["0", "1"];

pub(super) fn rf_range() -> Range {
    Range::new(RF_START_HZ, RF_STOP_HZ, LO_STEP_HZ).unwrap_or(Range::point(RF_START_HZ))
}

pub(super) fn dsp_range() -> Range {
    let half = MASTER_CLOCK_HZ / 2.0;
    Range::new(-half, half, MASTER_CLOCK_HZ / 2f64.powi(32)).unwrap_or(Range::point(0.0))
}

pub(super) fn rate_range() -> MetaRange {
    let points = (1..=MAX_DECIMATION)
        .rev()
        .map(|d| Range::point(MASTER_CLOCK_HZ / d as f64))
        .collect();
    MetaRange::new(points).unwrap_or(MetaRange::single(Range::point(MASTER_CLOCK_HZ)))
}

pub(super) fn bandwidth_range() -> MetaRange {
    MetaRange::single(
        Range::new(BW_START_HZ, BW_STOP_HZ, 1.0).unwrap_or(Range::point(BW_STOP_HZ)),
    )
}

/// Acquisition bookkeeping for one channel.
#[derive(Debug, Default)]
pub(super) struct ChannelStream {
    pub state: AcquisitionState,
    /// Board time of the first sample of the current burst.
    pub start: Option<TimeSpec>,
    /// Monotonic clock instant matching `start`.
    pub start_instant: Option<Duration>,
    /// Samples handed out (or dropped) since `start`.
    pub delivered: u64,
    pub fresh_burst: bool,
    /// Conditions to report on the next receive.
    pub pending: VecDeque<RxErrorCode>,
}

impl ChannelStream {
    pub fn arm(&mut self, start: TimeSpec, start_instant: Duration) {
        self.start = Some(start);
        self.start_instant = Some(start_instant);
        self.delivered = 0;
        self.fresh_burst = true;
    }

    pub fn disarm(&mut self) {
        self.start = None;
        self.start_instant = None;
        self.delivered = 0;
        self.fresh_burst = false;
    }
}

/// One physical receive front-end and everything configured on it.
#[derive(Debug)]
pub(super) struct SimFrontend {
    pub pair: SubDevSpecPair,
    pub rate: f64,
    pub rf_freq: f64,
    pub dsp_freq: f64,
    pub lna_gain: f64,
    pub pga_gain: f64,
    pub antenna: String,
    pub bandwidth: f64,
    /// Clock instant after which the LO reports lock.
    pub lo_locked_at: Duration,
    pub stream: ChannelStream,
}

impl SimFrontend {
    pub fn new(subdev: &str) -> Self {
        Self {
            pair: SubDevSpecPair::new(SLOT, subdev),
            rate: MASTER_CLOCK_HZ / 100.0,
            rf_freq: 1e9,
            dsp_freq: 0.0,
            lna_gain: 0.0,
            pga_gain: 0.0,
            antenna: ANTENNAS[0].to_string(),
            bandwidth: BW_STOP_HZ,
            lo_locked_at: Duration::ZERO,
            stream: ChannelStream::default(),
        }
    }

    pub fn name(&self) -> String {
        format!("SIM-6G RX{}", self.pair.sd_name)
    }

    pub fn frequency(&self) -> f64 {
        self.rf_freq + self.dsp_freq
    }

    /// Overall tunable range: the LO range widened by what the DSP stage
    /// can reach inside the analog bandwidth.
    pub fn frequency_range(&self) -> MetaRange {
        let rf = rf_range();
        let dsp = dsp_range();
        let reach = (self.bandwidth / 2.0).min(dsp.stop());
        let range = Range::new(rf.start() - reach, rf.stop() + reach, dsp.step())
            .unwrap_or(rf);
        MetaRange::single(range)
    }

    fn lna_active(&self) -> bool {
        self.antenna == ANTENNAS[0]
    }

    pub fn gain_names(&self) -> Vec<String> {
        if self.lna_active() {
            vec![LNA.to_string(), PGA.to_string()]
        } else {
            vec![PGA.to_string()]
        }
    }

    fn stage_range(&self, stage: &str) -> Result<Range> {
        match stage {
            LNA if self.lna_active() => Range::new(0.0, LNA_MAX_DB, LNA_STEP_DB),
            PGA => Range::new(0.0, PGA_MAX_DB, PGA_STEP_DB),
            other => Err(Error::InvalidParameter(format!(
                "gain stage {other:?} not available on antenna {}",
                self.antenna
            ))),
        }
    }

    pub fn gain_range(&self, stage: Option<&str>) -> Result<MetaRange> {
        match stage {
            Some(name) => Ok(MetaRange::single(self.stage_range(name)?)),
            None => {
                let stop = if self.lna_active() { LNA_MAX_DB } else { 0.0 } + PGA_MAX_DB;
                Ok(MetaRange::single(Range::new(0.0, stop, PGA_STEP_DB)?))
            }
        }
    }

    pub fn gain(&self, stage: Option<&str>) -> Result<f64> {
        match stage {
            Some(name) => {
                self.stage_range(name)?;
                Ok(if name == LNA { self.lna_gain } else { self.pga_gain })
            }
            None => Ok(self.lna_gain + self.pga_gain),
        }
    }

    pub fn set_gain(&mut self, gain: f64, stage: Option<&str>) -> Result<()> {
        let range = self.gain_range(stage)?;
        if !range.contains(gain) {
            return Err(Error::OutOfRange {
                what: "gain",
                value: gain,
                start: range.start(),
                stop: range.stop(),
            });
        }
        match stage {
            Some(LNA) => self.lna_gain = range.clip(gain, true),
            Some(_) => self.pga_gain = range.clip(gain, true),
            None => {
                // LNA takes whole steps first, the PGA covers the rest
                let lna = if self.lna_active() {
                    ((gain / LNA_STEP_DB).floor() * LNA_STEP_DB).min(LNA_MAX_DB)
                } else {
                    0.0
                };
                let pga = self.stage_range(PGA)?.clip(gain - lna, true);
                self.lna_gain = lna;
                self.pga_gain = pga;
            }
        }
        Ok(())
    }

    pub fn set_antenna(&mut self, antenna: &str) -> Result<()> {
        if !ANTENNAS.contains(&antenna) {
            return Err(Error::InvalidParameter(format!(
                "unknown antenna {antenna:?}, expected one of {ANTENNAS:?}"
            )));
        }
        self.antenna = antenna.to_string();
        if !self.lna_active() {
            self.lna_gain = 0.0;
        }
        Ok(())
    }

    pub fn set_bandwidth(&mut self, bandwidth: f64) -> Result<()> {
        let range = bandwidth_range();
        if !range.contains(bandwidth) {
            return Err(Error::OutOfRange {
                what: "bandwidth",
                value: bandwidth,
                start: range.start(),
                stop: range.stop(),
            });
        }
        self.bandwidth = range.clip(bandwidth, true);
        Ok(())
    }

    /// Set the rate to the nearest legal one, returning what was applied.
    pub fn set_rate(&mut self, rate: f64) -> Result<f64> {
        let range = rate_range();
        if !range.contains(rate) {
            return Err(Error::OutOfRange {
                what: "sample rate",
                value: rate,
                start: range.start(),
                stop: range.stop(),
            });
        }
        self.rate = range.clip(rate, true);
        Ok(self.rate)
    }

    pub fn sensor_names() -> Vec<String> {
        vec!["lo_locked".to_string(), "rssi".to_string()]
    }

    pub fn sensor(&self, name: &str, now: Duration, tone_hz: f64, tone_dbfs: f64) -> Result<SensorValue> {
        match name {
            "lo_locked" => Ok(SensorValue::boolean(
                name,
                now >= self.lo_locked_at,
                "locked",
                "unlocked",
            )),
            "rssi" => Ok(SensorValue::real(name, self.tone_power_dbfs(tone_hz, tone_dbfs), "dB")),
            other => Err(Error::UnknownSensor(format!("{other} on {}", self.pair))),
        }
    }

    /// Offset of the test tone from the tuned centre, if it falls in the
    /// filtered passband.
    pub fn tone_offset(&self, tone_hz: f64) -> Option<f64> {
        let offset = tone_hz - self.frequency();
        let edge = (self.bandwidth / 2.0).min(self.rate / 2.0);
        (offset.abs() < edge).then_some(offset)
    }

    /// Received tone level after gain, or the noise floor when out of band.
    pub fn tone_power_dbfs(&self, tone_hz: f64, tone_dbfs: f64) -> f64 {
        match self.tone_offset(tone_hz) {
            Some(_) => (tone_dbfs + self.lna_gain + self.pga_gain).min(0.0),
            None => NOISE_FLOOR_DBFS,
        }
    }
}

pub(super) const NOISE_FLOOR_DBFS: f64 = -80.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_distribution() {
        let mut fe = SimFrontend::new("0");
        fe.set_gain(35.5, None).unwrap();
        assert_eq!(fe.gain(Some("LNA")).unwrap(), 20.0);
        assert_eq!(fe.gain(Some("PGA")).unwrap(), 15.5);
        assert_eq!(fe.gain(None).unwrap(), 35.5);

        fe.set_gain(12.3, None).unwrap();
        assert_eq!(fe.gain(Some("LNA")).unwrap(), 10.0);
        assert_eq!(fe.gain(Some("PGA")).unwrap(), 2.5);
    }

    #[test]
    fn test_gain_range_follows_antenna() {
        let mut fe = SimFrontend::new("0");
        assert_eq!(fe.gain_range(None).unwrap().stop(), 51.5);
        fe.set_gain(40.0, None).unwrap();

        fe.set_antenna("TX/RX").unwrap();
        assert_eq!(fe.gain_range(None).unwrap().stop(), 31.5);
        assert_eq!(fe.gain_names(), vec!["PGA".to_string()]);
        assert!(fe.gain(Some("LNA")).is_err());
        assert_eq!(fe.gain(None).unwrap(), 20.0);
    }

    #[test]
    fn test_out_of_range_setters() {
        let mut fe = SimFrontend::new("0");
        assert!(matches!(fe.set_gain(60.0, None), Err(Error::OutOfRange { .. })));
        assert!(matches!(fe.set_bandwidth(1e3), Err(Error::OutOfRange { .. })));
        assert!(matches!(fe.set_rate(200e6), Err(Error::OutOfRange { .. })));
        assert!(fe.set_antenna("RX3").is_err());
    }

    #[test]
    fn test_rate_snaps_to_divisor() {
        let mut fe = SimFrontend::new("0");
        assert_eq!(fe.set_rate(1e6).unwrap(), 1e6);
        let applied = fe.set_rate(3e6).unwrap();
        assert!((applied - 100e6 / 33.0).abs() < 1.0);
    }

    #[test]
    fn test_lo_lock_sensor() {
        let mut fe = SimFrontend::new("0");
        fe.lo_locked_at = Duration::from_millis(5);
        let early = fe.sensor("lo_locked", Duration::from_millis(1), 0.0, 0.0).unwrap();
        assert!(!early.to_bool());
        let late = fe.sensor("lo_locked", Duration::from_millis(5), 0.0, 0.0).unwrap();
        assert!(late.to_bool());
        assert!(matches!(
            fe.sensor("temp", Duration::ZERO, 0.0, 0.0),
            Err(Error::UnknownSensor(_))
        ));
    }
}
