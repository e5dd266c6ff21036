//! Blocking sample receive over a flat caller buffer

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::SampleFormat;
use crate::device::connection::{check_channel, DeviceCore};
use crate::driver::RxTransport;
use crate::error::{Error, Result};
use crate::types::{RxMetadata, StreamArgs, StreamCommand};

struct StreamerInner {
    core: Arc<DeviceCore>,
    transport: Box<dyn RxTransport>,
    channels: Vec<usize>,
    format: SampleFormat,
}

/// A receive stream over a fixed set of channels.
///
/// The streamer shares the device connection with its handle, so it stays
/// usable if the handle is closed first. `receive` takes `&mut self`, which
/// keeps at most one receive in flight per streamer.
pub struct SampleStreamer {
    inner: Option<StreamerInner>,
}

impl SampleStreamer {
    pub(crate) fn open(core: Arc<DeviceCore>, args: &StreamArgs) -> Result<Self> {
        let format = SampleFormat::from_args(args)?;
        let channels = args.effective_channels();
        for (i, chan) in channels.iter().enumerate() {
            if channels[..i].contains(chan) {
                return Err(Error::InvalidParameter(format!(
                    "channel {chan} listed twice in stream args"
                )));
            }
        }
        let spp = format.samples_per_packet(args)?;
        let transport = core.with_driver(|driver| {
            for &chan in &channels {
                check_channel(driver, chan)?;
            }
            driver.open_rx_transport(format, spp, &channels)
        })?;

        info!(
            "Opened rx stream: {} on channels {:?}, {} samples/packet",
            format, channels, spp
        );
        Ok(Self {
            inner: Some(StreamerInner {
                core,
                transport,
                channels,
                format,
            }),
        })
    }

    fn inner(&self) -> Result<&StreamerInner> {
        self.inner.as_ref().ok_or(Error::Disposed("sample streamer"))
    }

    /// Receive up to `samples_per_buffer` samples per channel into `buffer`.
    ///
    /// `buffer` holds one block of `samples_per_buffer * bytes_per_sample()`
    /// bytes per channel, back to back in stream channel order. Blocks until
    /// the samples (or one packet, with `one_packet`) arrive or `timeout`
    /// passes. Timeouts, overflows and timing faults are reported in the
    /// returned metadata; only a closed streamer, an undersized buffer or a
    /// broken link are errors.
    pub fn receive(
        &mut self,
        buffer: &mut [u8],
        samples_per_buffer: usize,
        timeout: Duration,
        one_packet: bool,
    ) -> Result<(usize, RxMetadata)> {
        let inner = self
            .inner
            .as_mut()
            .ok_or(Error::Disposed("sample streamer"))?;
        if samples_per_buffer == 0 {
            return Ok((0, RxMetadata::default()));
        }

        let (per_channel, needed) = samples_per_buffer
            .checked_mul(inner.format.bytes_per_sample())
            .and_then(|per| per.checked_mul(inner.channels.len()).map(|all| (per, all)))
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "{} samples per buffer is too many",
                    samples_per_buffer
                ))
            })?;
        if buffer.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                actual: buffer.len(),
            });
        }
        let mut regions: Vec<&mut [u8]> = buffer[..needed].chunks_exact_mut(per_channel).collect();
        inner
            .transport
            .recv(&mut regions, samples_per_buffer, timeout, one_packet)
    }

    /// Issue `command` to all of this stream's channels at once.
    pub fn issue_stream_command(&self, command: &StreamCommand) -> Result<()> {
        let inner = self.inner()?;
        debug!("Issuing {} to stream channels {:?}", command, inner.channels);
        inner
            .core
            .with_driver(|driver| driver.issue_stream_command(command, &inner.channels))
    }

    pub fn channels(&self) -> Result<&[usize]> {
        Ok(&self.inner()?.channels)
    }

    pub fn channel_count(&self) -> Result<usize> {
        Ok(self.inner()?.channels.len())
    }

    pub fn format(&self) -> Result<SampleFormat> {
        Ok(self.inner()?.format)
    }

    /// Bytes of one complex sample in the host format.
    pub fn bytes_per_sample(&self) -> Result<usize> {
        Ok(self.inner()?.format.bytes_per_sample())
    }

    pub fn max_samples_per_packet(&self) -> Result<usize> {
        Ok(self.inner()?.transport.samples_per_packet())
    }

    /// Release the stream. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            debug!("Closing rx stream on channels {:?}", inner.channels);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for SampleStreamer {
    fn drop(&mut self) {
        self.close();
    }
}
