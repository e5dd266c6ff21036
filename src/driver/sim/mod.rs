//! Simulated multi-board receiver
//!
//! Implements the full driver surface in memory so the handle, streamer
//! and scan service can run without hardware. Board time is derived from
//! an injected [`Clock`], which lets tests step time exactly with a
//! [`ManualClock`](super::ManualClock).
//!
//! Each board carries one daughterboard slot (`A`) with two receive
//! front-ends (`A:0`, `A:1`); the default subdevice spec maps channel 0 of
//! every board to `A:0`. Samples are a deterministic test tone over a
//! low-level pseudo-noise floor, quantized through the wire format.

mod frontend;
mod transport;
mod tuning;

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::diagnostics::{DiagnosticSink, MessageKind, TracingSink};
use crate::error::{Error, Result};
use crate::stream::{AcquisitionState, SampleFormat, Transition};
use crate::types::{
    spec_markup, DeviceAddr, MetaRange, RxErrorCode, SensorValue, StreamCommand, StreamMode,
    SubDevSpecPair, TimeSpec, TuneRequest, TuneResult,
};

use super::{Clock, RadioDriver, RxTransport};
use frontend::{SimFrontend, SLOT, SUBDEVS};
use transport::SimRxTransport;
use tuning::TuneLimits;

const BOARD_NAME: &str = "SIM-RX";
const TIME_SOURCES: [&str; 3] = ["none", "external", "gpsdo"];
const CLOCK_SOURCES: [&str; 3] = ["internal", "external", "gpsdo"];
const BOARD_SENSORS: [&str; 4] = ["ref_locked", "gps_locked", "gps_time", "gps_gpgga"];

/// Power-on clock offset between consecutive boards.
const POWER_ON_SKEW_SECS: f64 = 0.137;

/// Simulator settings, taken from the device address.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub boards: usize,
    pub serial: String,
    /// Absolute frequency of the injected test tone.
    pub tone_hz: f64,
    /// Tone level at zero gain.
    pub tone_dbfs: f64,
    /// Samples a channel can buffer before it overflows.
    pub buffer_samples: u64,
    /// Time the LO takes to lock after a retune.
    pub lo_lock_delay: Duration,
    /// Largest board clock disagreement still reported as synchronized.
    pub sync_tolerance: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            boards: 1,
            serial: "SIM0001".to_string(),
            tone_hz: 1e9 + 100e3,
            tone_dbfs: -50.0,
            buffer_samples: 1 << 22,
            lo_lock_delay: Duration::ZERO,
            sync_tolerance: Duration::from_micros(100),
        }
    }
}

impl SimConfig {
    /// Read `boards`, `serial`, `tone_freq`, `tone_dbfs`, `buffer_samples`,
    /// `lo_lock_delay_ms` and `sync_tolerance_us` from the address.
    pub fn from_addr(addr: &DeviceAddr) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            boards: parse_key(addr, "boards")?.unwrap_or(defaults.boards),
            serial: addr
                .get("serial")
                .map(str::to_string)
                .unwrap_or(defaults.serial),
            tone_hz: parse_key(addr, "tone_freq")?.unwrap_or(defaults.tone_hz),
            tone_dbfs: parse_key(addr, "tone_dbfs")?.unwrap_or(defaults.tone_dbfs),
            buffer_samples: parse_key(addr, "buffer_samples")?.unwrap_or(defaults.buffer_samples),
            lo_lock_delay: parse_key(addr, "lo_lock_delay_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lo_lock_delay),
            sync_tolerance: parse_key(addr, "sync_tolerance_us")?
                .map(Duration::from_micros)
                .unwrap_or(defaults.sync_tolerance),
        })
    }
}

fn parse_key<T: std::str::FromStr>(addr: &DeviceAddr, key: &str) -> Result<Option<T>> {
    match addr.get(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::DeviceInit(format!("device argument {key}={raw:?} is not valid"))
        }),
        None => Ok(None),
    }
}

pub(super) struct SimBoard {
    serial: String,
    /// Board time at `clock_at_base`.
    time_base: TimeSpec,
    clock_at_base: Duration,
    time_set: bool,
    time_source: String,
    clock_source: String,
    frontends: Vec<SimFrontend>,
    /// Frontend index per logical channel on this board.
    spec: Vec<usize>,
}

impl SimBoard {
    fn new(index: usize, serial: &str, now: Duration) -> Self {
        Self {
            serial: format!("{serial}-{index}"),
            time_base: TimeSpec::from_secs_f64(POWER_ON_SKEW_SECS * (index + 1) as f64),
            clock_at_base: now,
            time_set: false,
            time_source: TIME_SOURCES[0].to_string(),
            clock_source: CLOCK_SOURCES[0].to_string(),
            frontends: SUBDEVS.iter().map(|sd| SimFrontend::new(sd)).collect(),
            spec: vec![0],
        }
    }

    fn time_at(&self, now: Duration) -> TimeSpec {
        let elapsed = now.saturating_sub(self.clock_at_base);
        self.time_base.add_secs(elapsed.as_secs_f64())
    }

    /// Clock instant at which this board reads `time`. Saturates for times
    /// the clock can never reach.
    fn instant_of(&self, time: &TimeSpec) -> Duration {
        let secs = time.secs_since(&self.time_base).max(0.0);
        Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|offset| self.clock_at_base.checked_add(offset))
            .unwrap_or(Duration::MAX)
    }

    fn set_time(&mut self, time: TimeSpec, now: Duration) {
        self.time_base = time;
        self.clock_at_base = now;
        self.time_set = true;
    }
}

pub(super) struct SimState {
    config: SimConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
    boards: Vec<SimBoard>,
    faults: VecDeque<RxErrorCode>,
}

impl SimState {
    fn board(&self, board: usize) -> Result<&SimBoard> {
        let count = self.boards.len();
        self.boards
            .get(board)
            .ok_or(Error::InvalidBoard { index: board, count })
    }

    fn board_mut(&mut self, board: usize) -> Result<&mut SimBoard> {
        let count = self.boards.len();
        self.boards
            .get_mut(board)
            .ok_or(Error::InvalidBoard { index: board, count })
    }

    fn channel_count(&self) -> usize {
        self.boards.iter().map(|b| b.spec.len()).sum()
    }

    /// Board index and frontend index of a logical channel.
    fn locate(&self, chan: usize) -> Result<(usize, usize)> {
        let mut base = 0;
        for (b, board) in self.boards.iter().enumerate() {
            if chan < base + board.spec.len() {
                return Ok((b, board.spec[chan - base]));
            }
            base += board.spec.len();
        }
        Err(Error::InvalidChannel {
            index: chan,
            count: base,
        })
    }

    fn frontend(&self, chan: usize) -> Result<&SimFrontend> {
        let (b, f) = self.locate(chan)?;
        Ok(&self.boards[b].frontends[f])
    }

    fn frontend_mut(&mut self, chan: usize) -> Result<&mut SimFrontend> {
        let (b, f) = self.locate(chan)?;
        Ok(&mut self.boards[b].frontends[f])
    }

    fn now(&self) -> Duration {
        self.clock.elapsed()
    }
}

fn lock_state(state: &Mutex<SimState>) -> Result<MutexGuard<'_, SimState>> {
    state
        .lock()
        .map_err(|_| Error::Transport("simulator state poisoned".to_string()))
}

/// Test hooks into a running simulator.
#[derive(Clone)]
pub struct SimControl {
    state: Arc<Mutex<SimState>>,
}

impl SimControl {
    /// Report `code` on the next receive of any stream.
    pub fn inject(&self, code: RxErrorCode) -> Result<()> {
        lock_state(&self.state)?.faults.push_back(code);
        Ok(())
    }

    /// Clock instant at which a channel's current burst started.
    pub fn start_instant(&self, chan: usize) -> Result<Option<Duration>> {
        let state = lock_state(&self.state)?;
        Ok(state.frontend(chan)?.stream.start_instant)
    }
}

/// The simulated device.
pub struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    pub fn new(config: SimConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.boards == 0 {
            return Err(Error::DeviceInit("simulator needs at least one board".to_string()));
        }
        let now = clock.elapsed();
        let boards = (0..config.boards)
            .map(|b| SimBoard::new(b, &config.serial, now))
            .collect();
        Ok(Self {
            state: Arc::new(Mutex::new(SimState {
                config,
                clock,
                sink: Arc::new(TracingSink),
                boards,
                faults: VecDeque::new(),
            })),
        })
    }

    pub fn from_addr(addr: &DeviceAddr, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(SimConfig::from_addr(addr)?, clock)
    }

    pub fn control(&self) -> SimControl {
        SimControl {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        lock_state(&self.state)
    }
}

fn check_source(kind: &str, source: &str, legal: &[&str]) -> Result<()> {
    if legal.contains(&source) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "unknown {kind} source {source:?}, expected one of {legal:?}"
        )))
    }
}

/// NMEA GGA sentence for the board's fixed antenna position.
fn gpgga_sentence() -> String {
    let body = format!(
        "GPGGA,{},4740.5080,N,12207.3470,W,1,08,0.9,52.0,M,-17.0,M,,",
        Utc::now().format("%H%M%S%.3f")
    );
    let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{checksum:02X}")
}

impl RadioDriver for SimDriver {
    fn attach_sink(&mut self, sink: Arc<dyn DiagnosticSink>) {
        if let Ok(mut state) = self.lock() {
            state.sink = sink;
        }
    }

    fn board_count(&self) -> usize {
        self.lock().map(|s| s.boards.len()).unwrap_or(0)
    }

    fn board_name(&self, board: usize) -> Result<String> {
        self.lock()?.board(board)?;
        Ok(BOARD_NAME.to_string())
    }

    fn device_properties(&self) -> String {
        let Ok(state) = self.lock() else {
            return String::new();
        };
        let mut out = String::new();
        let _ = writeln!(out, "Simulated receiver ({}):", state.config.serial);
        let mut chan = 0;
        for (b, board) in state.boards.iter().enumerate() {
            let _ = writeln!(out, "  Mboard {b}: {BOARD_NAME}");
            let _ = writeln!(out, "    Serial: {}", board.serial);
            let _ = writeln!(out, "    Time source: {}", board.time_source);
            let _ = writeln!(out, "    Clock source: {}", board.clock_source);
            for &f in &board.spec {
                let fe = &board.frontends[f];
                let _ = writeln!(out, "    RX Channel: {chan}");
                let _ = writeln!(out, "      RX Dboard: {}", fe.pair.db_name);
                let _ = writeln!(out, "      RX Subdev: {}", fe.name());
                chan += 1;
            }
        }
        out
    }

    fn set_time_now(&mut self, time: TimeSpec, board: usize) -> Result<()> {
        let mut state = self.lock()?;
        let now = state.now();
        state.board_mut(board)?.set_time(time, now);
        debug!("Board {} time set to {}", board, time);
        Ok(())
    }

    fn set_time_now_all(&mut self, time: TimeSpec) -> Result<()> {
        let mut state = self.lock()?;
        let now = state.now();
        for board in state.boards.iter_mut() {
            board.set_time(time, now);
        }
        debug!("All boards time set to {}", time);
        Ok(())
    }

    fn time_now(&self, board: usize) -> Result<TimeSpec> {
        let state = self.lock()?;
        let now = state.now();
        Ok(state.board(board)?.time_at(now))
    }

    fn is_time_synchronized(&self) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        let now = state.now();
        let tolerance = state.config.sync_tolerance.as_secs_f64();
        let mut times = state.boards.iter().map(|b| b.time_at(now));
        let Some(first) = times.next() else {
            return false;
        };
        times.all(|t| t.secs_since(&first).abs() <= tolerance)
    }

    fn set_time_source(&mut self, source: &str, board: usize) -> Result<()> {
        check_source("time", source, &TIME_SOURCES)?;
        self.lock()?.board_mut(board)?.time_source = source.to_string();
        Ok(())
    }

    fn time_source(&self, board: usize) -> Result<String> {
        Ok(self.lock()?.board(board)?.time_source.clone())
    }

    fn time_sources(&self, board: usize) -> Result<Vec<String>> {
        self.lock()?.board(board)?;
        Ok(TIME_SOURCES.iter().map(|s| s.to_string()).collect())
    }

    fn set_clock_source(&mut self, source: &str, board: usize) -> Result<()> {
        check_source("clock", source, &CLOCK_SOURCES)?;
        self.lock()?.board_mut(board)?.clock_source = source.to_string();
        Ok(())
    }

    fn clock_source(&self, board: usize) -> Result<String> {
        Ok(self.lock()?.board(board)?.clock_source.clone())
    }

    fn clock_sources(&self, board: usize) -> Result<Vec<String>> {
        self.lock()?.board(board)?;
        Ok(CLOCK_SOURCES.iter().map(|s| s.to_string()).collect())
    }

    fn board_sensor(&self, name: &str, board: usize) -> Result<SensorValue> {
        let state = self.lock()?;
        let brd = state.board(board)?;
        match name {
            "ref_locked" => Ok(SensorValue::boolean(name, true, "locked", "unlocked")),
            "gps_locked" => Ok(SensorValue::boolean(
                name,
                brd.time_source == "gpsdo" || brd.clock_source == "gpsdo",
                "locked",
                "unlocked",
            )),
            "gps_time" => Ok(SensorValue::integer(name, Utc::now().timestamp(), "seconds")),
            "gps_gpgga" => Ok(SensorValue::new(name, gpgga_sentence(), "")),
            other => Err(Error::UnknownSensor(format!("{other} on board {board}"))),
        }
    }

    fn board_sensor_names(&self, board: usize) -> Result<Vec<String>> {
        self.lock()?.board(board)?;
        Ok(BOARD_SENSORS.iter().map(|s| s.to_string()).collect())
    }

    fn set_subdev_spec(&mut self, spec: &[SubDevSpecPair], board: usize) -> Result<()> {
        if spec.is_empty() {
            return Err(Error::InvalidParameter("empty subdevice spec".to_string()));
        }
        let mut indices = Vec::with_capacity(spec.len());
        for pair in spec {
            let index = SUBDEVS
                .iter()
                .position(|sd| pair.db_name == SLOT && pair.sd_name == *sd)
                .ok_or_else(|| {
                    Error::InvalidParameter(format!("no receive front-end at {pair}"))
                })?;
            if indices.contains(&index) {
                return Err(Error::InvalidParameter(format!(
                    "front-end {pair} listed twice in subdevice spec"
                )));
            }
            indices.push(index);
        }

        let mut state = self.lock()?;
        let sink = Arc::clone(&state.sink);
        let brd = state.board_mut(board)?;
        for (f, fe) in brd.frontends.iter_mut().enumerate() {
            if !indices.contains(&f) {
                fe.stream.state = AcquisitionState::Idle;
                fe.stream.disarm();
            }
        }
        brd.spec = indices;
        sink.message(
            MessageKind::Status,
            &format!("board {board} subdev spec set to {}", spec_markup(spec)),
        );
        Ok(())
    }

    fn subdev_spec(&self, board: usize) -> Result<Vec<SubDevSpecPair>> {
        let state = self.lock()?;
        let brd = state.board(board)?;
        Ok(brd.spec.iter().map(|&f| brd.frontends[f].pair.clone()).collect())
    }

    fn channel_count(&self) -> usize {
        self.lock().map(|s| s.channel_count()).unwrap_or(0)
    }

    fn channel_board(&self, chan: usize) -> Result<usize> {
        Ok(self.lock()?.locate(chan)?.0)
    }

    fn subdev_name(&self, chan: usize) -> Result<String> {
        Ok(self.lock()?.frontend(chan)?.name())
    }

    fn rx_info(&self, chan: usize) -> Result<BTreeMap<String, String>> {
        let state = self.lock()?;
        let (b, f) = state.locate(chan)?;
        let board = &state.boards[b];
        let fe = &board.frontends[f];
        let spec: Vec<SubDevSpecPair> = board
            .spec
            .iter()
            .map(|&i| board.frontends[i].pair.clone())
            .collect();

        let mut info = BTreeMap::new();
        info.insert("mboard_id".to_string(), BOARD_NAME.to_string());
        info.insert("mboard_serial".to_string(), board.serial.clone());
        info.insert("rx_id".to_string(), "SIM-6G (0x0100)".to_string());
        info.insert("rx_serial".to_string(), format!("{}-{}", board.serial, fe.pair.sd_name));
        info.insert("rx_subdev_name".to_string(), fe.name());
        info.insert("rx_subdev_spec".to_string(), spec_markup(&spec));
        info.insert("rx_antenna".to_string(), fe.antenna.clone());
        Ok(info)
    }

    fn set_rate(&mut self, rate: f64, chan: usize) -> Result<()> {
        let mut state = self.lock()?;
        let applied = state.frontend_mut(chan)?.set_rate(rate)?;
        if (applied - rate).abs() > 1.0 {
            state.sink.message(
                MessageKind::Warning,
                &format!("requested rx rate {rate} Hz on channel {chan}, coerced to {applied} Hz"),
            );
        }
        Ok(())
    }

    fn rate(&self, chan: usize) -> Result<f64> {
        Ok(self.lock()?.frontend(chan)?.rate)
    }

    fn rates(&self, chan: usize) -> Result<MetaRange> {
        self.lock()?.frontend(chan)?;
        Ok(frontend::rate_range())
    }

    fn tune(&mut self, request: &TuneRequest, chan: usize) -> Result<TuneResult> {
        let mut state = self.lock()?;
        let now = state.now();
        let lock_delay = state.config.lo_lock_delay;
        let limits = TuneLimits {
            rf: frontend::rf_range(),
            dsp: frontend::dsp_range(),
        };
        let fe = state.frontend_mut(chan)?;
        let in_range = fe.frequency_range().contains(request.target_freq_hz);
        let result = tuning::negotiate(request, fe.rf_freq, fe.dsp_freq, &limits)?;
        if result.actual_rf_freq_hz != fe.rf_freq {
            fe.lo_locked_at = now + lock_delay;
        }
        fe.rf_freq = result.actual_rf_freq_hz;
        fe.dsp_freq = result.actual_dsp_freq_hz;
        if !in_range {
            state.sink.message(
                MessageKind::Warning,
                &format!(
                    "tune target {} Hz on channel {chan} is outside the tunable range",
                    request.target_freq_hz
                ),
            );
        }
        Ok(result)
    }

    fn frequency(&self, chan: usize) -> Result<f64> {
        Ok(self.lock()?.frontend(chan)?.frequency())
    }

    fn frequency_range(&self, chan: usize) -> Result<MetaRange> {
        Ok(self.lock()?.frontend(chan)?.frequency_range())
    }

    fn frontend_frequency_range(&self, chan: usize) -> Result<MetaRange> {
        self.lock()?.frontend(chan)?;
        Ok(MetaRange::single(frontend::rf_range()))
    }

    fn set_gain(&mut self, gain: f64, stage: Option<&str>, chan: usize) -> Result<()> {
        self.lock()?.frontend_mut(chan)?.set_gain(gain, stage)
    }

    fn gain(&self, stage: Option<&str>, chan: usize) -> Result<f64> {
        self.lock()?.frontend(chan)?.gain(stage)
    }

    fn gain_range(&self, stage: Option<&str>, chan: usize) -> Result<MetaRange> {
        self.lock()?.frontend(chan)?.gain_range(stage)
    }

    fn gain_names(&self, chan: usize) -> Result<Vec<String>> {
        Ok(self.lock()?.frontend(chan)?.gain_names())
    }

    fn set_antenna(&mut self, antenna: &str, chan: usize) -> Result<()> {
        self.lock()?.frontend_mut(chan)?.set_antenna(antenna)
    }

    fn antenna(&self, chan: usize) -> Result<String> {
        Ok(self.lock()?.frontend(chan)?.antenna.clone())
    }

    fn antennas(&self, chan: usize) -> Result<Vec<String>> {
        self.lock()?.frontend(chan)?;
        Ok(frontend::ANTENNAS.iter().map(|a| a.to_string()).collect())
    }

    fn set_bandwidth(&mut self, bandwidth: f64, chan: usize) -> Result<()> {
        self.lock()?.frontend_mut(chan)?.set_bandwidth(bandwidth)
    }

    fn bandwidth(&self, chan: usize) -> Result<f64> {
        Ok(self.lock()?.frontend(chan)?.bandwidth)
    }

    fn bandwidth_range(&self, chan: usize) -> Result<MetaRange> {
        self.lock()?.frontend(chan)?;
        Ok(frontend::bandwidth_range())
    }

    fn channel_sensor(&self, name: &str, chan: usize) -> Result<SensorValue> {
        let state = self.lock()?;
        let now = state.now();
        let (tone_hz, tone_dbfs) = (state.config.tone_hz, state.config.tone_dbfs);
        state.frontend(chan)?.sensor(name, now, tone_hz, tone_dbfs)
    }

    fn channel_sensor_names(&self, chan: usize) -> Result<Vec<String>> {
        self.lock()?.frontend(chan)?;
        Ok(SimFrontend::sensor_names())
    }

    fn issue_stream_command(&mut self, command: &StreamCommand, channels: &[usize]) -> Result<()> {
        let mut state = self.lock()?;
        let targets = channels
            .iter()
            .map(|&chan| state.locate(chan))
            .collect::<Result<Vec<_>>>()?;
        let now = state.now();
        let mut late = false;

        for (b, f) in targets {
            let board = &state.boards[b];
            let board_now = board.time_at(now);
            let start = if command.stream_now {
                Some((board_now, now))
            } else if board.time_set && command.time_spec >= board_now {
                Some((command.time_spec, board.instant_of(&command.time_spec)))
            } else {
                None
            };

            let stream = &mut state.boards[b].frontends[f].stream;
            if command.mode == StreamMode::StopContinuous {
                stream.pending.clear();
            } else if start.is_none() {
                // One report per command, not per channel.
                if !late {
                    stream.pending.push_back(RxErrorCode::LateCommand);
                    late = true;
                }
                continue;
            }

            let (next, transition) = stream.state.apply(command.mode, command.num_samps);
            stream.state = next;
            match (transition, start) {
                (Transition::Armed, Some((time, instant))) => stream.arm(time, instant),
                (Transition::Stopped, _) => stream.disarm(),
                _ => {}
            }
        }

        if late {
            state.sink.message(MessageKind::FastPath, "L");
        }
        Ok(())
    }

    fn stream_state(&self, chan: usize) -> Result<AcquisitionState> {
        Ok(self.lock()?.frontend(chan)?.stream.state)
    }

    fn open_rx_transport(
        &mut self,
        format: SampleFormat,
        samples_per_packet: usize,
        channels: &[usize],
    ) -> Result<Box<dyn RxTransport>> {
        let targets = {
            let state = self.lock()?;
            channels
                .iter()
                .map(|&chan| state.locate(chan))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Box::new(SimRxTransport::new(
            Arc::clone(&self.state),
            targets,
            format,
            samples_per_packet,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ManualClock;

    fn sim(boards: usize) -> (SimDriver, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = SimConfig {
            boards,
            ..SimConfig::default()
        };
        (SimDriver::new(config, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_config_from_addr() {
        let addr = DeviceAddr::new()
            .with("type", "sim")
            .with("boards", "3")
            .with("lo_lock_delay_ms", "5");
        let config = SimConfig::from_addr(&addr).unwrap();
        assert_eq!(config.boards, 3);
        assert_eq!(config.lo_lock_delay, Duration::from_millis(5));

        let bad = DeviceAddr::new().with("boards", "many");
        assert!(matches!(SimConfig::from_addr(&bad), Err(Error::DeviceInit(_))));
    }

    #[test]
    fn test_zero_boards_rejected() {
        let config = SimConfig {
            boards: 0,
            ..SimConfig::default()
        };
        assert!(SimDriver::new(config, Arc::new(ManualClock::new())).is_err());
    }

    #[test]
    fn test_boards_start_unsynchronized() {
        let (mut driver, clock) = sim(2);
        assert!(!driver.is_time_synchronized());

        driver.set_time_now(TimeSpec::new(100, 0.0), 0).unwrap();
        clock.advance(Duration::from_millis(10));
        driver.set_time_now(TimeSpec::new(100, 0.0), 1).unwrap();
        assert!(!driver.is_time_synchronized());

        driver.set_time_now_all(TimeSpec::new(200, 0.0)).unwrap();
        assert!(driver.is_time_synchronized());
        clock.advance(Duration::from_secs(1));
        assert_eq!(driver.time_now(1).unwrap(), TimeSpec::new(201, 0.0));
    }

    #[test]
    fn test_subdev_spec_maps_channels() {
        let (mut driver, _) = sim(2);
        assert_eq!(driver.channel_count(), 2);

        let spec = [SubDevSpecPair::new("A", "1"), SubDevSpecPair::new("A", "0")];
        driver.set_subdev_spec(&spec, 0).unwrap();
        assert_eq!(driver.channel_count(), 3);
        assert_eq!(driver.subdev_name(0).unwrap(), "SIM-6G RX1");
        assert_eq!(driver.channel_board(2).unwrap(), 1);
        assert_eq!(driver.rx_info(1).unwrap()["rx_subdev_spec"], "A:1 A:0");

        let dup = [SubDevSpecPair::new("A", "0"), SubDevSpecPair::new("A", "0")];
        assert!(driver.set_subdev_spec(&dup, 0).is_err());
        assert!(driver.set_subdev_spec(&[SubDevSpecPair::new("B", "0")], 0).is_err());
        assert!(matches!(
            driver.subdev_spec(5),
            Err(Error::InvalidBoard { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_sources_validated() {
        let (mut driver, _) = sim(1);
        driver.set_clock_source("external", 0).unwrap();
        assert_eq!(driver.clock_source(0).unwrap(), "external");
        assert!(driver.set_time_source("pps", 0).is_err());
        assert_eq!(driver.time_sources(0).unwrap().len(), 3);
    }

    #[test]
    fn test_board_sensors() {
        let (mut driver, _) = sim(1);
        assert!(driver.board_sensor("ref_locked", 0).unwrap().to_bool());
        assert!(!driver.board_sensor("gps_locked", 0).unwrap().to_bool());
        driver.set_time_source("gpsdo", 0).unwrap();
        assert!(driver.board_sensor("gps_locked", 0).unwrap().to_bool());

        let gga = driver.board_sensor("gps_gpgga", 0).unwrap();
        assert!(gga.value().starts_with("$GPGGA,"));
        assert!(driver.board_sensor("voltage", 0).is_err());
    }

    #[test]
    fn test_lo_lock_follows_retune() {
        let clock = Arc::new(ManualClock::new());
        let config = SimConfig {
            lo_lock_delay: Duration::from_millis(3),
            ..SimConfig::default()
        };
        let mut driver = SimDriver::new(config, clock.clone()).unwrap();
        driver.tune(&TuneRequest::new(2.4e9), 0).unwrap();
        assert!(!driver.channel_sensor("lo_locked", 0).unwrap().to_bool());
        clock.advance(Duration::from_millis(3));
        assert!(driver.channel_sensor("lo_locked", 0).unwrap().to_bool());
    }

    #[test]
    fn test_scheduled_command_on_unset_board_is_late() {
        let (mut driver, clock) = sim(1);
        let control = driver.control();
        clock.advance(Duration::from_secs(1));
        let cmd = StreamCommand::start_continuous().at(TimeSpec::new(5, 0.0));
        driver.issue_stream_command(&cmd, &[0]).unwrap();
        assert_eq!(driver.stream_state(0).unwrap(), AcquisitionState::Idle);
        assert_eq!(control.start_instant(0).unwrap(), None);
    }

    #[test]
    fn test_scheduled_start_instant() {
        let (mut driver, clock) = sim(1);
        let control = driver.control();
        driver.set_time_now(TimeSpec::new(10, 0.0), 0).unwrap();
        let cmd = StreamCommand::num_samps_and_done(1000).at(TimeSpec::new(10, 0.5));
        driver.issue_stream_command(&cmd, &[0]).unwrap();
        assert!(driver.stream_state(0).unwrap().is_armed());
        assert_eq!(
            control.start_instant(0).unwrap(),
            Some(clock.elapsed() + Duration::from_millis(500))
        );
    }
}
