//! Band-scan acquisition thread
//!
//! Walks the configured band one bandwidth-wide step at a time: tune,
//! wait for LO lock, pull a fixed burst of samples from every scanned
//! channel and publish its mean power.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::device::{DeviceHandle, SensorScope};
use crate::stream::{HostFormat, SampleStreamer};
use crate::types::{RxErrorCode, StreamArgs, StreamCommand, TimeSpec, TuneRequest, TuneResult};

/// Tune attempts per step before giving up on it.
const TUNE_ATTEMPTS: usize = 10;

/// `lo_locked` polls per tune attempt.
const LOCK_POLLS: usize = 50;
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Relative error within which a tuned stage counts as on target.
const TUNE_TOLERANCE: f64 = 1e-4;

/// Acquisition attempts per step after timeouts, overflows or re-syncs.
const ACQUIRE_ATTEMPTS: usize = 3;

const RECORD_QUEUE: usize = 1000;

/// Floor reported for a silent block.
const POWER_FLOOR_DBFS: f64 = -200.0;

/// Apply the configured settings to every scanned channel and every board.
pub fn configure(device: &DeviceHandle, config: &CaptureConfig) -> Result<()> {
    for board in 0..device.board_count()? {
        device
            .set_clock_source(&config.clock_source, board)
            .with_context(|| format!("Failed to set clock source on board {board}"))?;
        device
            .set_time_source(&config.time_source, board)
            .with_context(|| format!("Failed to set time source on board {board}"))?;
    }

    for &chan in &config.channels {
        device
            .set_rate(config.rate_hz, chan)
            .with_context(|| format!("Failed to set rate on channel {chan}"))?;
        device
            .set_bandwidth(config.bandwidth_hz, chan)
            .with_context(|| format!("Failed to set bandwidth on channel {chan}"))?;
        device
            .set_antenna(&config.antenna, chan)
            .with_context(|| format!("Failed to set antenna on channel {chan}"))?;
        device
            .set_gain(config.gain_db, None, chan)
            .with_context(|| format!("Failed to set gain on channel {chan}"))?;
        info!(
            "  Channel {}: rate {} Hz, bandwidth {} Hz, gain {} dB, antenna {}",
            chan,
            device.rate(chan)?,
            device.bandwidth(chan)?,
            device.gain(None, chan)?,
            device.antenna(chan)?
        );
    }

    device
        .set_time_now_all(Some(TimeSpec::ZERO))
        .context("Failed to reset device time")?;
    Ok(())
}

/// One step's measurement on one channel
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub timestamp_ms: u64,
    pub channel: usize,
    pub center_freq_hz: f64,
    pub tune: TuneResult,
    /// Device time of the first sample in the burst
    pub time_spec: TimeSpec,
    pub samples: usize,
    pub mean_power_dbfs: f64,
}

/// Statistics for the scan (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub samples_received: AtomicU64,
    pub steps_completed: AtomicU64,
    pub sweeps_completed: AtomicU64,
    pub records_dropped: AtomicU64,
    pub timeouts: AtomicU64,
    pub overflows: AtomicU64,
    pub resyncs: AtomicU64,
    pub failed_steps: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Band-scan controller
pub struct ScanCapture {
    config: CaptureConfig,
    device: Arc<DeviceHandle>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
}

impl ScanCapture {
    pub fn new(config: CaptureConfig, device: DeviceHandle) -> Self {
        Self {
            config,
            device: Arc::new(device),
            running: Arc::new(AtomicBool::new(false)),
            stats: CaptureStats::new(),
        }
    }

    /// Start scanning and return a receiver for per-step records.
    ///
    /// The scan thread drops the sender when it exits, so the receiver
    /// disconnects once the scan is over.
    pub fn start(&self) -> Result<Receiver<ScanRecord>> {
        let plan = self.config.scan_plan();
        info!("===========================================");
        info!("  Starting band scan");
        info!("===========================================");
        info!("  Channels: {:?}", self.config.channels);
        info!(
            "  Band: {:.3} - {:.3} MHz in {} steps",
            self.config.start_freq_hz / 1e6,
            self.config.stop_freq_hz / 1e6,
            plan.len()
        );
        info!("  Samples per step: {}", self.config.samples_per_scan);
        if self.config.lo_offset_hz != 0.0 {
            info!("  LO offset: {} Hz", self.config.lo_offset_hz);
        }

        let (record_tx, record_rx) = bounded::<ScanRecord>(RECORD_QUEUE);

        let config = self.config.clone();
        let device = self.device.clone();
        let running = self.running.clone();
        let stats = self.stats.clone();

        running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("band-scan".to_string())
            .spawn(move || {
                if let Err(e) = run_scan(&config, &device, &plan, &running, &stats, record_tx) {
                    error!("Band scan error: {:#}", e);
                }
                running.store(false, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(e).context("Failed to spawn scan thread");
        }

        Ok(record_rx)
    }

    /// Stop scanning
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping band scan...");
        }
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get statistics
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }
}

impl Drop for ScanCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main scan loop (runs in dedicated thread)
fn run_scan(
    config: &CaptureConfig,
    device: &DeviceHandle,
    plan: &[f64],
    running: &AtomicBool,
    stats: &CaptureStats,
    record_tx: Sender<ScanRecord>,
) -> Result<()> {
    let args = StreamArgs::new(config.cpu_format.as_str(), config.otw_format.as_str())
        .with_channels(config.channels.clone());
    let mut streamer = device.rx_stream(&args).context("Failed to open rx stream")?;
    let host = streamer.format()?.host;
    let width = streamer.bytes_per_sample()?;
    let mut buffer = vec![0u8; config.samples_per_scan * width * config.channels.len()];

    info!("===========================================");
    info!("  SCAN STARTED!");
    info!(
        "  {} on the host, {} bytes/sample, {} samples/packet",
        host,
        width,
        streamer.max_samples_per_packet()?
    );
    info!("===========================================");

    let mut last_stats_time = Instant::now();

    'sweep: while running.load(Ordering::SeqCst) {
        for &freq in plan {
            if !running.load(Ordering::SeqCst) {
                break 'sweep;
            }
            let tunes = match tune_channels(device, config, freq) {
                Ok(tunes) => tunes,
                Err(e) => {
                    warn!("Skipping {:.3} MHz: {:#}", freq / 1e6, e);
                    CaptureStats::bump(&stats.failed_steps);
                    continue;
                }
            };

            match acquire(&mut streamer, device, config, host, &mut buffer, stats)? {
                Some(burst) => {
                    CaptureStats::bump(&stats.steps_completed);
                    for (i, &chan) in config.channels.iter().enumerate() {
                        let record = ScanRecord {
                            timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
                            channel: chan,
                            center_freq_hz: freq,
                            tune: tunes[i],
                            time_spec: burst.time_spec,
                            samples: burst.samples,
                            mean_power_dbfs: burst.power_dbfs[i],
                        };
                        debug!(
                            "{:.3} MHz ch{}: {:.1} dBFS",
                            freq / 1e6,
                            chan,
                            record.mean_power_dbfs
                        );
                        if record_tx.try_send(record).is_err() {
                            CaptureStats::bump(&stats.records_dropped);
                            debug!("Record channel full, dropping record");
                        }
                    }
                }
                None => {
                    warn!("No samples at {:.3} MHz after {} attempts", freq / 1e6, ACQUIRE_ATTEMPTS);
                    CaptureStats::bump(&stats.failed_steps);
                }
            }

            if last_stats_time.elapsed() >= config.stats_interval {
                info!(
                    "[Scan Stats] Steps: {} | Sweeps: {} | Samples: {} | Timeouts: {} | Overflows: {} | Resyncs: {}",
                    stats.steps_completed.load(Ordering::Relaxed),
                    stats.sweeps_completed.load(Ordering::Relaxed),
                    stats.samples_received.load(Ordering::Relaxed),
                    stats.timeouts.load(Ordering::Relaxed),
                    stats.overflows.load(Ordering::Relaxed),
                    stats.resyncs.load(Ordering::Relaxed)
                );
                last_stats_time = Instant::now();
            }
        }
        CaptureStats::bump(&stats.sweeps_completed);
    }

    streamer.close();
    info!("Band scan stopped");
    info!(
        "Final stats: Steps={}, Sweeps={}, Samples={}, Failed steps={}",
        stats.steps_completed.load(Ordering::Relaxed),
        stats.sweeps_completed.load(Ordering::Relaxed),
        stats.samples_received.load(Ordering::Relaxed),
        stats.failed_steps.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Tune every scanned channel onto `freq` and wait for their LOs to lock.
fn tune_channels(device: &DeviceHandle, config: &CaptureConfig, freq: f64) -> Result<Vec<TuneResult>> {
    config
        .channels
        .iter()
        .map(|&chan| tune_and_lock(device, chan, freq, config.lo_offset_hz))
        .collect()
}

fn tune_and_lock(device: &DeviceHandle, chan: usize, freq: f64, lo_offset: f64) -> Result<TuneResult> {
    let request = if lo_offset != 0.0 {
        TuneRequest::with_lo_offset(freq, lo_offset)
    } else {
        TuneRequest::new(freq)
    };

    for attempt in 1..=TUNE_ATTEMPTS {
        let result = device.tune(&request, chan)?;
        if !result.settled(TUNE_TOLERANCE) {
            debug!("Tune attempt {} on channel {} off target: {}", attempt, chan, result);
            continue;
        }
        for _ in 0..LOCK_POLLS {
            if device.sensor("lo_locked", SensorScope::Channel(chan))?.to_bool() {
                return Ok(result);
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
        debug!("LO on channel {} not locked after attempt {}", chan, attempt);
    }
    Err(anyhow!(
        "channel {} failed to settle at {} Hz after {} attempts",
        chan,
        freq,
        TUNE_ATTEMPTS
    ))
}

struct Burst {
    time_spec: TimeSpec,
    samples: usize,
    power_dbfs: Vec<f64>,
}

enum Outcome {
    Done(Burst),
    Retry,
}

/// Acquire one burst of `samples_per_scan` samples, retrying recoverable
/// faults. `None` when every attempt failed.
fn acquire(
    streamer: &mut SampleStreamer,
    device: &DeviceHandle,
    config: &CaptureConfig,
    host: HostFormat,
    buffer: &mut [u8],
    stats: &CaptureStats,
) -> Result<Option<Burst>> {
    for _ in 0..ACQUIRE_ATTEMPTS {
        match acquire_once(streamer, device, config, host, buffer, stats)? {
            Outcome::Done(burst) => return Ok(Some(burst)),
            Outcome::Retry => {
                // Leftovers from the failed burst must not bleed into the retry.
                streamer.issue_stream_command(&StreamCommand::stop_continuous())?;
            }
        }
    }
    Ok(None)
}

fn acquire_once(
    streamer: &mut SampleStreamer,
    device: &DeviceHandle,
    config: &CaptureConfig,
    host: HostFormat,
    buffer: &mut [u8],
    stats: &CaptureStats,
) -> Result<Outcome> {
    let wanted = config.samples_per_scan;
    let channels = config.channels.len();
    let width = host.bytes_per_sample();

    streamer.issue_stream_command(&StreamCommand::num_samps_and_done(wanted as u64))?;

    let mut received = 0;
    let mut first_time = None;
    let mut power_sums = vec![0.0; channels];

    while received < wanted {
        let remaining = wanted - received;
        let (count, md) = streamer.receive(buffer, remaining, config.receive_timeout, false)?;

        match md.error_code {
            RxErrorCode::None => {}
            RxErrorCode::Timeout => {
                CaptureStats::bump(&stats.timeouts);
                warn!("Receive timed out after {} of {} samples", received, wanted);
                return Ok(Outcome::Retry);
            }
            RxErrorCode::Overflow => {
                CaptureStats::bump(&stats.overflows);
                debug!("Overflow after {} of {} samples", received, wanted);
                return Ok(Outcome::Retry);
            }
            code => {
                CaptureStats::bump(&stats.resyncs);
                warn!("Receive reported {}, re-synchronising device time", code);
                device.set_time_now_all(None)?;
                return Ok(Outcome::Retry);
            }
        }

        if first_time.is_none() && md.has_time_spec {
            first_time = Some(md.time_spec);
        }
        let block = remaining * width;
        for (c, sum) in power_sums.iter_mut().enumerate() {
            let start = c * block;
            *sum += block_power(host, &buffer[start..start + count * width]);
        }
        received += count;
        stats.samples_received.fetch_add(count as u64, Ordering::Relaxed);

        if md.end_of_burst {
            break;
        }
    }

    if received == 0 {
        return Ok(Outcome::Retry);
    }
    Ok(Outcome::Done(Burst {
        time_spec: first_time.unwrap_or(TimeSpec::ZERO),
        samples: received,
        power_dbfs: power_sums
            .into_iter()
            .map(|sum| to_dbfs(sum / received as f64))
            .collect(),
    }))
}

/// Sum of `i² + q²` over the samples in `bytes`.
fn block_power(host: HostFormat, bytes: &[u8]) -> f64 {
    bytes
        .chunks_exact(host.bytes_per_sample())
        .map(|sample| {
            let (i, q) = host.read_sample(sample);
            i * i + q * q
        })
        .sum()
}

fn to_dbfs(mean_power: f64) -> f64 {
    if mean_power > 0.0 {
        (10.0 * mean_power.log10()).max(POWER_FLOOR_DBFS)
    } else {
        POWER_FLOOR_DBFS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::driver::clock::SystemClock;
    use crate::driver::sim::{SimConfig, SimControl, SimDriver};

    fn scan_config(pairs: &[(&str, &str)]) -> CaptureConfig {
        let mut vars: Vec<(String, String)> = vec![
            ("RX_START_FREQ".into(), "999e6".into()),
            ("RX_STOP_FREQ".into(), "1001e6".into()),
            ("SAMPLES_PER_SCAN".into(), "4000".into()),
            ("RECEIVE_TIMEOUT_MS".into(), "1000".into()),
        ];
        vars.extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        CaptureConfig::from_vars(vars)
    }

    fn sim_device() -> (DeviceHandle, SimControl) {
        let driver = SimDriver::new(SimConfig::default(), Arc::new(SystemClock::new())).unwrap();
        let control = driver.control();
        let handle = DeviceHandle::from_driver(Box::new(driver), Arc::new(CollectingSink::new()));
        (handle, control)
    }

    fn collect(rx: &Receiver<ScanRecord>, n: usize) -> Vec<ScanRecord> {
        let mut records = Vec::new();
        while records.len() < n {
            match rx.recv_timeout(Duration::from_secs(10)) {
                Ok(record) => records.push(record),
                Err(e) => panic!("scan produced {} records before {:?}", records.len(), e),
            }
        }
        records
    }

    fn drain(rx: &Receiver<ScanRecord>) {
        while rx.recv_timeout(Duration::from_secs(10)).is_ok() {}
    }

    #[test]
    fn test_block_power_and_dbfs() {
        let host = HostFormat::Fc32;
        let mut bytes = vec![0u8; 4 * host.bytes_per_sample()];
        for sample in bytes.chunks_exact_mut(host.bytes_per_sample()) {
            host.write_sample(sample, 0.1, 0.0);
        }
        let sum = block_power(host, &bytes);
        assert!((to_dbfs(sum / 4.0) + 20.0).abs() < 1e-4);
        assert_eq!(to_dbfs(0.0), POWER_FLOOR_DBFS);
    }

    #[test]
    fn test_configure_applies_settings() {
        let config = scan_config(&[("RX_GAIN", "25"), ("RX_BANDWIDTH", "2e6")]);
        let (device, _) = sim_device();
        configure(&device, &config).unwrap();
        assert_eq!(device.gain(None, 0).unwrap(), 25.0);
        assert_eq!(device.bandwidth(0).unwrap(), 2e6);
        assert_eq!(device.clock_source(0).unwrap(), "internal");
        assert!(device.time_now(0).unwrap() < TimeSpec::from_secs_f64(1.0));
    }

    #[test]
    fn test_configure_rejects_unknown_antenna() {
        let config = scan_config(&[("RX_ANTENNA", "DISH")]);
        let (device, _) = sim_device();
        assert!(configure(&device, &config).is_err());
    }

    #[test]
    fn test_tune_with_lo_offset_locks() {
        let (device, _) = sim_device();
        let result = tune_and_lock(&device, 0, 1e9, 2e6).unwrap();
        assert_eq!(result.actual_rf_freq_hz, 1.002e9);
        assert!((device.frequency(0).unwrap() - 1e9).abs() < 1.0);
    }

    #[test]
    fn test_scan_finds_tone() {
        // Default simulator tone sits at 1000.1 MHz, inside the second step.
        let config = scan_config(&[]);
        let (device, _) = sim_device();
        configure(&device, &config).unwrap();
        let capture = ScanCapture::new(config, device);
        let rx = capture.start().unwrap();
        let records = collect(&rx, 2);
        capture.stop();
        drain(&rx);

        assert_eq!(records[0].center_freq_hz, 999.5e6);
        assert_eq!(records[1].center_freq_hz, 1000.5e6);
        assert!(records.iter().all(|r| r.samples == 4000));
        assert!(records[1].mean_power_dbfs > records[0].mean_power_dbfs + 10.0);
        assert!(!capture.is_running());
        assert!(capture.stats().steps_completed.load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn test_scan_resyncs_after_late_command() {
        let config = scan_config(&[]);
        let (device, control) = sim_device();
        configure(&device, &config).unwrap();
        control.inject(RxErrorCode::LateCommand).unwrap();
        let capture = ScanCapture::new(config, device);
        let rx = capture.start().unwrap();
        let records = collect(&rx, 1);
        capture.stop();
        drain(&rx);

        assert_eq!(records[0].samples, 4000);
        assert_eq!(capture.stats().resyncs.load(Ordering::Relaxed), 1);
        assert!(capture.device().is_time_synchronized().unwrap());
    }

    #[test]
    fn test_scan_records_serialize() {
        let record = ScanRecord {
            timestamp_ms: 1,
            channel: 0,
            center_freq_hz: 1e9,
            tune: TuneResult::default(),
            time_spec: TimeSpec::ZERO,
            samples: 10,
            mean_power_dbfs: -42.5,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"mean_power_dbfs\":-42.5"));
        assert!(json.contains("\"channel\":0"));
    }
}
