use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::connection::{check_board, check_channel, DeviceCore};
use super::report;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::driver::{self, RadioDriver};
use crate::error::{Error, Result};
use crate::stream::{AcquisitionState, SampleStreamer, StreamController};
use crate::types::{
    spec_markup, DeviceAddr, MetaRange, SensorValue, StreamArgs, SubDevSpecPair, TimeSpec,
    TuneRequest, TuneResult,
};

/// Where a sensor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorScope {
    Board(usize),
    Channel(usize),
}

/// Exclusive handle to one radio unit.
///
/// All configuration goes through `&self`, so a handle can be shared
/// (e.g. in an `Arc`) between a control thread and an acquisition thread.
/// [`close`](Self::close) is idempotent and also runs on drop; any call
/// after that fails with [`Error::Disposed`].
pub struct DeviceHandle {
    core: Option<Arc<DeviceCore>>,
}

impl DeviceHandle {
    /// Open the device named by `addr`, logging driver messages via `tracing`.
    pub fn open(addr: &DeviceAddr) -> Result<Self> {
        Self::open_with_sink(addr, Arc::new(TracingSink))
    }

    /// Open the device named by `addr`, routing its driver messages to `sink`.
    pub fn open_with_sink(addr: &DeviceAddr, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let driver = driver::open_driver(addr)?;
        info!("Device opened: {}", addr);
        Ok(Self::from_driver(driver, sink))
    }

    /// Wrap an already-open driver.
    pub fn from_driver(driver: Box<dyn RadioDriver>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            core: Some(DeviceCore::new(driver, sink)),
        }
    }

    fn core(&self) -> Result<&Arc<DeviceCore>> {
        self.core.as_ref().ok_or(Error::Disposed("device handle"))
    }

    fn with_driver<T>(&self, f: impl FnOnce(&mut dyn RadioDriver) -> Result<T>) -> Result<T> {
        self.core()?.with_driver(f)
    }

    fn with_board<T>(
        &self,
        board: usize,
        f: impl FnOnce(&mut dyn RadioDriver) -> Result<T>,
    ) -> Result<T> {
        self.with_driver(|driver| {
            check_board(driver, board)?;
            f(driver)
        })
    }

    fn with_channel<T>(
        &self,
        chan: usize,
        f: impl FnOnce(&mut dyn RadioDriver) -> Result<T>,
    ) -> Result<T> {
        self.with_driver(|driver| {
            check_channel(driver, chan)?;
            f(driver)
        })
    }

    /// Release the handle's share of the device. Streamers created from it
    /// keep the connection alive until they are closed too.
    pub fn close(&mut self) {
        if let Some(core) = self.core.take() {
            core.mark_handle_closed();
            info!("Device handle closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_none()
    }

    // Boards

    pub fn board_count(&self) -> Result<usize> {
        self.with_driver(|d| Ok(d.board_count()))
    }

    pub fn board_name(&self, board: usize) -> Result<String> {
        self.with_board(board, |d| d.board_name(board))
    }

    pub fn device_properties(&self) -> Result<String> {
        self.with_driver(|d| Ok(d.device_properties()))
    }

    // Time and clock references

    /// Set a board's clock to `time`, or to the host's current time if `None`.
    pub fn set_time_now(&self, board: usize, time: Option<TimeSpec>) -> Result<()> {
        let time = time.unwrap_or_else(TimeSpec::host_now);
        debug!("Setting board {} time to {}", board, time);
        self.with_board(board, |d| d.set_time_now(time, board))
    }

    /// Set every board's clock from one instant.
    pub fn set_time_now_all(&self, time: Option<TimeSpec>) -> Result<()> {
        let time = time.unwrap_or_else(TimeSpec::host_now);
        debug!("Setting all board times to {}", time);
        self.with_driver(|d| d.set_time_now_all(time))
    }

    pub fn time_now(&self, board: usize) -> Result<TimeSpec> {
        self.with_board(board, |d| d.time_now(board))
    }

    /// Whether every board reports the same time right now.
    pub fn is_time_synchronized(&self) -> Result<bool> {
        self.with_driver(|d| Ok(d.is_time_synchronized()))
    }

    pub fn set_time_source(&self, source: &str, board: usize) -> Result<()> {
        self.with_board(board, |d| d.set_time_source(source, board))
    }

    pub fn time_source(&self, board: usize) -> Result<String> {
        self.with_board(board, |d| d.time_source(board))
    }

    pub fn time_sources(&self, board: usize) -> Result<Vec<String>> {
        self.with_board(board, |d| d.time_sources(board))
    }

    pub fn set_clock_source(&self, source: &str, board: usize) -> Result<()> {
        self.with_board(board, |d| d.set_clock_source(source, board))
    }

    pub fn clock_source(&self, board: usize) -> Result<String> {
        self.with_board(board, |d| d.clock_source(board))
    }

    pub fn clock_sources(&self, board: usize) -> Result<Vec<String>> {
        self.with_board(board, |d| d.clock_sources(board))
    }

    // Sensors

    pub fn sensor(&self, name: &str, scope: SensorScope) -> Result<SensorValue> {
        match scope {
            SensorScope::Board(board) => self.with_board(board, |d| d.board_sensor(name, board)),
            SensorScope::Channel(chan) => self.with_channel(chan, |d| d.channel_sensor(name, chan)),
        }
    }

    pub fn sensor_names(&self, scope: SensorScope) -> Result<Vec<String>> {
        match scope {
            SensorScope::Board(board) => self.with_board(board, |d| d.board_sensor_names(board)),
            SensorScope::Channel(chan) => self.with_channel(chan, |d| d.channel_sensor_names(chan)),
        }
    }

    // Channel mapping

    /// Map logical channels to front-ends on `board`, or on every board if
    /// `None`. Pair order defines channel numbering on the board.
    pub fn set_subdev_spec(&self, spec: &[SubDevSpecPair], board: Option<usize>) -> Result<()> {
        let markup = spec_markup(spec);
        self.with_driver(|d| match board {
            Some(board) => {
                check_board(d, board)?;
                d.set_subdev_spec(spec, board)
            }
            None => (0..d.board_count()).try_for_each(|b| d.set_subdev_spec(spec, b)),
        })?;
        info!("Subdevice spec set to {} on {:?}", markup, board);
        Ok(())
    }

    pub fn subdev_spec(&self, board: usize) -> Result<Vec<SubDevSpecPair>> {
        self.with_board(board, |d| d.subdev_spec(board))
    }

    /// Logical receive channels across all boards.
    pub fn channel_count(&self) -> Result<usize> {
        self.with_driver(|d| Ok(d.channel_count()))
    }

    pub fn subdev_name(&self, chan: usize) -> Result<String> {
        self.with_channel(chan, |d| d.subdev_name(chan))
    }

    pub fn rx_info(&self, chan: usize) -> Result<BTreeMap<String, String>> {
        self.with_channel(chan, |d| d.rx_info(chan))
    }

    // Per-channel settings

    pub fn set_rate(&self, rate: f64, chan: usize) -> Result<()> {
        self.with_channel(chan, |d| d.set_rate(rate, chan))
    }

    pub fn rate(&self, chan: usize) -> Result<f64> {
        self.with_channel(chan, |d| d.rate(chan))
    }

    pub fn rates(&self, chan: usize) -> Result<MetaRange> {
        self.with_channel(chan, |d| d.rates(chan))
    }

    /// Tune to `freq_hz` with both stages on auto.
    pub fn set_frequency(&self, freq_hz: f64, chan: usize) -> Result<TuneResult> {
        self.tune(&TuneRequest::new(freq_hz), chan)
    }

    /// Two-stage tune honouring each stage's policy.
    pub fn tune(&self, request: &TuneRequest, chan: usize) -> Result<TuneResult> {
        let result = self.with_channel(chan, |d| d.tune(request, chan))?;
        debug!("Channel {} tuned: {}", chan, result);
        Ok(result)
    }

    /// Centre frequency currently delivered (RF and DSP stages combined).
    pub fn frequency(&self, chan: usize) -> Result<f64> {
        self.with_channel(chan, |d| d.frequency(chan))
    }

    pub fn frequency_range(&self, chan: usize) -> Result<MetaRange> {
        self.with_channel(chan, |d| d.frequency_range(chan))
    }

    /// Range of the RF stage alone.
    pub fn frontend_frequency_range(&self, chan: usize) -> Result<MetaRange> {
        self.with_channel(chan, |d| d.frontend_frequency_range(chan))
    }

    /// Set the overall gain (`stage` of `None`) or one named stage.
    pub fn set_gain(&self, gain: f64, stage: Option<&str>, chan: usize) -> Result<()> {
        self.with_channel(chan, |d| d.set_gain(gain, stage, chan))
    }

    pub fn gain(&self, stage: Option<&str>, chan: usize) -> Result<f64> {
        self.with_channel(chan, |d| d.gain(stage, chan))
    }

    /// Legal gains for the current antenna selection.
    pub fn gain_range(&self, stage: Option<&str>, chan: usize) -> Result<MetaRange> {
        self.with_channel(chan, |d| d.gain_range(stage, chan))
    }

    pub fn gain_names(&self, chan: usize) -> Result<Vec<String>> {
        self.with_channel(chan, |d| d.gain_names(chan))
    }

    pub fn set_antenna(&self, antenna: &str, chan: usize) -> Result<()> {
        self.with_channel(chan, |d| d.set_antenna(antenna, chan))
    }

    pub fn antenna(&self, chan: usize) -> Result<String> {
        self.with_channel(chan, |d| d.antenna(chan))
    }

    pub fn antennas(&self, chan: usize) -> Result<Vec<String>> {
        self.with_channel(chan, |d| d.antennas(chan))
    }

    pub fn set_bandwidth(&self, bandwidth: f64, chan: usize) -> Result<()> {
        self.with_channel(chan, |d| d.set_bandwidth(bandwidth, chan))
    }

    pub fn bandwidth(&self, chan: usize) -> Result<f64> {
        self.with_channel(chan, |d| d.bandwidth(chan))
    }

    pub fn bandwidth_range(&self, chan: usize) -> Result<MetaRange> {
        self.with_channel(chan, |d| d.bandwidth_range(chan))
    }

    // Acquisition

    pub fn stream_controller(&self) -> Result<StreamController> {
        Ok(StreamController::new(Arc::clone(self.core()?)))
    }

    pub fn stream_state(&self, chan: usize) -> Result<AcquisitionState> {
        self.with_channel(chan, |d| d.stream_state(chan))
    }

    /// Open a receive stream for `args.channels` (channel 0 if empty).
    pub fn rx_stream(&self, args: &StreamArgs) -> Result<SampleStreamer> {
        SampleStreamer::open(Arc::clone(self.core()?), args)
    }

    /// Multi-line dump of every board and channel.
    pub fn report(&self) -> Result<String> {
        report::render(self)
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}
