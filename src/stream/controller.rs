//! Acquisition command issuing

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::AcquisitionState;
use crate::device::connection::{check_channel, DeviceCore};
use crate::diagnostics::MessageKind;
use crate::error::{Error, Result};
use crate::types::StreamCommand;

/// Issues stream commands that move channels through the acquisition
/// state machine.
///
/// Obtained from [`DeviceHandle::stream_controller`](crate::DeviceHandle::stream_controller);
/// stops working once the handle is closed.
#[derive(Clone)]
pub struct StreamController {
    core: Arc<DeviceCore>,
}

impl StreamController {
    pub(crate) fn new(core: Arc<DeviceCore>) -> Self {
        Self { core }
    }

    fn live(&self) -> Result<&DeviceCore> {
        if self.core.handle_closed() {
            Err(Error::Disposed("device handle"))
        } else {
            Ok(&self.core)
        }
    }

    /// Issue `command` to one channel.
    pub fn issue(&self, command: &StreamCommand, chan: usize) -> Result<()> {
        self.issue_many(command, &[chan])
    }

    /// Issue `command` to several channels from one time snapshot.
    ///
    /// A scheduled command spanning boards whose clocks disagree is still
    /// sent, but a warning goes to the device's diagnostic sink since the
    /// boards will not start together.
    pub fn issue_many(&self, command: &StreamCommand, channels: &[usize]) -> Result<()> {
        let core = self.live()?;
        core.with_driver(|driver| {
            let mut boards = BTreeSet::new();
            for &chan in channels {
                check_channel(driver, chan)?;
                boards.insert(driver.channel_board(chan)?);
            }
            if !command.stream_now && boards.len() > 1 && !driver.is_time_synchronized() {
                core.sink().message(
                    MessageKind::Warning,
                    &format!(
                        "scheduled {} spans {} boards whose clocks are not synchronized",
                        command.mode,
                        boards.len()
                    ),
                );
            }
            debug!("Issuing {} to channels {:?}", command, channels);
            driver.issue_stream_command(command, channels)
        })
    }

    /// Issue `command` to every channel of the device.
    pub fn issue_all(&self, command: &StreamCommand) -> Result<()> {
        let count = self.live()?.with_driver(|driver| Ok(driver.channel_count()))?;
        let channels: Vec<usize> = (0..count).collect();
        self.issue_many(command, &channels)
    }

    pub fn state(&self, chan: usize) -> Result<AcquisitionState> {
        self.live()?.with_driver(|driver| {
            check_channel(driver, chan)?;
            driver.stream_state(chan)
        })
    }
}
