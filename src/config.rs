//! Configuration loaded from environment variables

use std::collections::HashMap;
use std::time::Duration;

use crate::types::DeviceAddr;

/// Prefix of the variables that make up the device address.
/// `DEVICE_ARG_SERIAL=abc` becomes `serial=abc`.
const DEVICE_ARG_PREFIX: &str = "DEVICE_ARG_";

/// Scan service configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Address used to find the receiver
    pub device_addr: DeviceAddr,

    /// Receive channels scanned together
    pub channels: Vec<usize>,

    /// Sample rate in samples/s
    pub rate_hz: f64,

    /// Overall gain in dB
    pub gain_db: f64,

    /// Analog bandwidth in Hz, also the scan step
    pub bandwidth_hz: f64,

    pub antenna: String,

    /// Scan band lower edge in Hz
    pub start_freq_hz: f64,

    /// Scan band upper edge in Hz
    pub stop_freq_hz: f64,

    /// LO offset in Hz (0 tunes the LO straight onto each step)
    pub lo_offset_hz: f64,

    /// Samples per channel acquired at every step
    pub samples_per_scan: usize,

    pub cpu_format: String,
    pub otw_format: String,
    pub clock_source: String,
    pub time_source: String,

    /// Per-call receive timeout
    pub receive_timeout: Duration,

    /// Statistics logging interval
    pub stats_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from_vars(std::iter::empty())
    }
}

impl CaptureConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from `(name, value)` pairs, falling back to
    /// defaults for anything missing or unparseable.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(key).map(|s| s.trim().to_string());
        let parse_f64 = |key: &str, default: f64| {
            get(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        let mut device_addr = DeviceAddr::new();
        for (name, value) in &vars {
            if let Some(key) = name.strip_prefix(DEVICE_ARG_PREFIX) {
                if !key.is_empty() {
                    device_addr.insert(key.to_ascii_lowercase(), value.trim());
                }
            }
        }
        if device_addr.get("type").is_none() {
            device_addr.insert("type", "sim");
        }

        Self {
            device_addr,

            channels: get("RX_CHANNELS")
                .and_then(|s| parse_channels(&s))
                .unwrap_or_else(|| vec![0]),

            rate_hz: parse_f64("RX_RATE", 1e6),

            gain_db: parse_f64("RX_GAIN", 10.0),

            bandwidth_hz: parse_f64("RX_BANDWIDTH", 1e6),

            antenna: get("RX_ANTENNA").unwrap_or_else(|| "RX2".to_string()),

            start_freq_hz: parse_f64("RX_START_FREQ", 995e6),

            stop_freq_hz: parse_f64("RX_STOP_FREQ", 1005e6),

            lo_offset_hz: parse_f64("RX_LO_OFFSET", 0.0),

            samples_per_scan: get("SAMPLES_PER_SCAN")
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(100_000),

            cpu_format: get("CPU_FORMAT").unwrap_or_else(|| "fc32".to_string()),

            otw_format: get("OTW_FORMAT").unwrap_or_else(|| "sc16".to_string()),

            clock_source: get("CLOCK_SOURCE").unwrap_or_else(|| "internal".to_string()),

            time_source: get("TIME_SOURCE").unwrap_or_else(|| "none".to_string()),

            receive_timeout: Duration::from_millis(
                get("RECEIVE_TIMEOUT_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3000),
            ),

            stats_interval: Duration::from_secs(
                get("STATS_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|&n| n > 0)
                    .unwrap_or(5),
            ),
        }
    }

    /// Centre frequencies visited by one sweep of the band.
    pub fn scan_plan(&self) -> Vec<f64> {
        scan_plan(self.start_freq_hz, self.stop_freq_hz, self.bandwidth_hz)
    }
}

/// `"0,1"` style channel list. `None` if empty or any entry is bad.
fn parse_channels(s: &str) -> Option<Vec<usize>> {
    let channels = s
        .split(',')
        .map(|c| c.trim().parse().ok())
        .collect::<Option<Vec<usize>>>()?;
    if channels.is_empty() {
        None
    } else {
        Some(channels)
    }
}

/// Split `[start, stop)` into `step`-wide slices and return their centres.
/// A degenerate band yields a single step at `start`.
pub fn scan_plan(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return vec![start];
    }
    let mut plan = Vec::new();
    let mut edge = start;
    while edge < stop {
        plan.push(edge + step / 2.0);
        edge += step;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.device_addr.get("type"), Some("sim"));
        assert_eq!(config.channels, vec![0]);
        assert_eq!(config.cpu_format, "fc32");
        assert_eq!(config.otw_format, "sc16");
        assert_eq!(config.receive_timeout, Duration::from_secs(3));
        assert_eq!(config.scan_plan().len(), 10);
    }

    #[test]
    fn test_device_args_lower_cased() {
        let config = CaptureConfig::from_vars(vars(&[
            ("DEVICE_ARG_TYPE", "sim"),
            ("DEVICE_ARG_BOARDS", "2"),
            ("DEVICE_ARG_SERIAL", "F00D"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(config.device_addr.get("boards"), Some("2"));
        assert_eq!(config.device_addr.get("serial"), Some("F00D"));
        assert_eq!(config.device_addr.get("path"), None);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = CaptureConfig::from_vars(vars(&[
            ("RX_CHANNELS", "0, 1"),
            ("RX_RATE", "2e6"),
            ("RX_GAIN", "loud"),
            ("SAMPLES_PER_SCAN", "0"),
            ("RX_LO_OFFSET", "-250000"),
        ]));
        assert_eq!(config.channels, vec![0, 1]);
        assert_eq!(config.rate_hz, 2e6);
        assert_eq!(config.gain_db, 10.0);
        assert_eq!(config.samples_per_scan, 100_000);
        assert_eq!(config.lo_offset_hz, -250e3);

        let config = CaptureConfig::from_vars(vars(&[("RX_CHANNELS", "0,x")]));
        assert_eq!(config.channels, vec![0]);
    }

    #[test]
    fn test_scan_plan_centres() {
        assert_eq!(
            scan_plan(100e6, 104e6, 1e6),
            vec![100.5e6, 101.5e6, 102.5e6, 103.5e6]
        );
        assert_eq!(scan_plan(100e6, 100e6, 1e6), vec![100e6]);
        assert_eq!(scan_plan(100e6, 101e6, 0.0), vec![100e6]);
    }
}
