//! Driver layer below the device handle
//!
//! [`RadioDriver`] is the command/response seam to one radio unit and
//! [`RxTransport`] the data path of one open stream. Link framing and
//! discovery live behind these traits; the handle and streamer only see
//! typed calls.

pub mod clock;
pub mod sim;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::diagnostics::DiagnosticSink;
use crate::error::{Error, Result};
use crate::stream::{AcquisitionState, SampleFormat};
use crate::types::{
    DeviceAddr, MetaRange, RxMetadata, SensorValue, StreamCommand, SubDevSpecPair, TimeSpec,
    TuneRequest, TuneResult,
};

pub use clock::{Clock, ManualClock, SystemClock};

/// Control interface to one (possibly multi-board) radio unit.
///
/// Board and channel indices are validated by the caller against
/// [`board_count`](RadioDriver::board_count) and
/// [`channel_count`](RadioDriver::channel_count); implementations still
/// return an error rather than panic on a bad index.
pub trait RadioDriver: Send {
    /// Route driver messages to `sink` from now on.
    fn attach_sink(&mut self, sink: Arc<dyn DiagnosticSink>);

    // Boards
    fn board_count(&self) -> usize;
    fn board_name(&self, board: usize) -> Result<String>;
    /// Multi-line human-readable summary of boards and channels.
    fn device_properties(&self) -> String;

    // Time and clock references
    fn set_time_now(&mut self, time: TimeSpec, board: usize) -> Result<()>;
    /// Set every board from one instant so their clocks agree exactly.
    fn set_time_now_all(&mut self, time: TimeSpec) -> Result<()>;
    fn time_now(&self, board: usize) -> Result<TimeSpec>;
    fn is_time_synchronized(&self) -> bool;
    fn set_time_source(&mut self, source: &str, board: usize) -> Result<()>;
    fn time_source(&self, board: usize) -> Result<String>;
    fn time_sources(&self, board: usize) -> Result<Vec<String>>;
    fn set_clock_source(&mut self, source: &str, board: usize) -> Result<()>;
    fn clock_source(&self, board: usize) -> Result<String>;
    fn clock_sources(&self, board: usize) -> Result<Vec<String>>;
    fn board_sensor(&self, name: &str, board: usize) -> Result<SensorValue>;
    fn board_sensor_names(&self, board: usize) -> Result<Vec<String>>;

    // Channel mapping
    fn set_subdev_spec(&mut self, spec: &[SubDevSpecPair], board: usize) -> Result<()>;
    fn subdev_spec(&self, board: usize) -> Result<Vec<SubDevSpecPair>>;
    fn channel_count(&self) -> usize;
    /// Board a logical channel lives on.
    fn channel_board(&self, chan: usize) -> Result<usize>;
    fn subdev_name(&self, chan: usize) -> Result<String>;
    fn rx_info(&self, chan: usize) -> Result<BTreeMap<String, String>>;

    // Per-channel settings
    fn set_rate(&mut self, rate: f64, chan: usize) -> Result<()>;
    fn rate(&self, chan: usize) -> Result<f64>;
    fn rates(&self, chan: usize) -> Result<MetaRange>;
    fn tune(&mut self, request: &TuneRequest, chan: usize) -> Result<TuneResult>;
    fn frequency(&self, chan: usize) -> Result<f64>;
    fn frequency_range(&self, chan: usize) -> Result<MetaRange>;
    fn frontend_frequency_range(&self, chan: usize) -> Result<MetaRange>;
    /// `stage` of `None` addresses the overall gain.
    fn set_gain(&mut self, gain: f64, stage: Option<&str>, chan: usize) -> Result<()>;
    fn gain(&self, stage: Option<&str>, chan: usize) -> Result<f64>;
    fn gain_range(&self, stage: Option<&str>, chan: usize) -> Result<MetaRange>;
    fn gain_names(&self, chan: usize) -> Result<Vec<String>>;
    fn set_antenna(&mut self, antenna: &str, chan: usize) -> Result<()>;
    fn antenna(&self, chan: usize) -> Result<String>;
    fn antennas(&self, chan: usize) -> Result<Vec<String>>;
    fn set_bandwidth(&mut self, bandwidth: f64, chan: usize) -> Result<()>;
    fn bandwidth(&self, chan: usize) -> Result<f64>;
    fn bandwidth_range(&self, chan: usize) -> Result<MetaRange>;
    fn channel_sensor(&self, name: &str, chan: usize) -> Result<SensorValue>;
    fn channel_sensor_names(&self, chan: usize) -> Result<Vec<String>>;

    // Acquisition
    /// Apply one command to every channel in `channels` from a single
    /// snapshot of board time.
    fn issue_stream_command(&mut self, command: &StreamCommand, channels: &[usize]) -> Result<()>;
    fn stream_state(&self, chan: usize) -> Result<AcquisitionState>;
    fn open_rx_transport(
        &mut self,
        format: SampleFormat,
        samples_per_packet: usize,
        channels: &[usize],
    ) -> Result<Box<dyn RxTransport>>;
}

/// Data path of one open receive stream.
pub trait RxTransport: Send {
    /// Fill up to `samples` samples into each of `buffers` (one per channel,
    /// in stream order). Data-path conditions come back in the metadata.
    fn recv(
        &mut self,
        buffers: &mut [&mut [u8]],
        samples: usize,
        timeout: Duration,
        one_packet: bool,
    ) -> Result<(usize, RxMetadata)>;

    fn samples_per_packet(&self) -> usize;
}

/// Find and open the device named by `addr`.
pub fn open_driver(addr: &DeviceAddr) -> Result<Box<dyn RadioDriver>> {
    debug!("Looking for device: {}", addr);
    match addr.get("type") {
        Some("sim") => {
            let driver = sim::SimDriver::from_addr(addr, Arc::new(SystemClock::new()))?;
            info!(
                "Opened simulated receiver with {} board(s)",
                driver.board_count()
            );
            Ok(Box::new(driver))
        }
        _ => Err(Error::DeviceNotFound(addr.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sim() {
        let addr = DeviceAddr::new().with("type", "sim").with("boards", "2");
        let driver = open_driver(&addr).unwrap();
        assert_eq!(driver.board_count(), 2);
        assert_eq!(driver.channel_count(), 2);
    }

    #[test]
    fn test_open_unknown_device() {
        let addr = DeviceAddr::new().with("addr", "192.168.10.2");
        assert!(matches!(open_driver(&addr), Err(Error::DeviceNotFound(_))));
    }
}
