//! Stream commands and stream arguments

use std::fmt;

use serde::{Deserialize, Serialize};

use super::addr::DeviceAddr;
use super::time::TimeSpec;

/// Acquisition command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamMode {
    /// Stream until told to stop.
    StartContinuous,
    /// Stop a continuous stream.
    StopContinuous,
    /// Deliver `num_samps` samples, then end the burst.
    NumSampsAndDone,
    /// Deliver `num_samps` samples and expect a follow-up bounded command.
    NumSampsAndMore,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamMode::StartContinuous => "StartContinuous",
            StreamMode::StopContinuous => "StopContinuous",
            StreamMode::NumSampsAndDone => "NumSampsAndDone",
            StreamMode::NumSampsAndMore => "NumSampsAndMore",
        };
        f.write_str(s)
    }
}

/// A timed or immediate acquisition command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamCommand {
    pub mode: StreamMode,
    pub num_samps: u64,
    /// Start on receipt; when false the command waits for `time_spec`.
    pub stream_now: bool,
    pub time_spec: TimeSpec,
}

impl StreamCommand {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            num_samps: 0,
            stream_now: true,
            time_spec: TimeSpec::ZERO,
        }
    }

    pub fn start_continuous() -> Self {
        Self::new(StreamMode::StartContinuous)
    }

    pub fn stop_continuous() -> Self {
        Self::new(StreamMode::StopContinuous)
    }

    pub fn num_samps_and_done(num_samps: u64) -> Self {
        Self {
            num_samps,
            ..Self::new(StreamMode::NumSampsAndDone)
        }
    }

    pub fn num_samps_and_more(num_samps: u64) -> Self {
        Self {
            num_samps,
            ..Self::new(StreamMode::NumSampsAndMore)
        }
    }

    /// Schedule the command for an absolute device time.
    pub fn at(mut self, time_spec: TimeSpec) -> Self {
        self.stream_now = false;
        self.time_spec = time_spec;
        self
    }
}

impl fmt::Display for StreamCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} num_samps={}", self.mode, self.num_samps)?;
        if self.stream_now {
            write!(f, " now")
        } else {
            write!(f, " at {}", self.time_spec)
        }
    }
}

/// Parameters for creating a sample streamer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamArgs {
    /// Host-side sample encoding tag (`fc64`, `fc32`, `sc16`, `sc8`).
    pub cpu_format: String,
    /// Wire-side sample encoding tag (`sc16`, `sc12`, `sc8`).
    pub otw_format: String,
    /// Extra transport arguments (e.g. `spp`).
    pub args: DeviceAddr,
    /// Logical channels, in buffer order. Empty means channel 0.
    pub channels: Vec<usize>,
}

impl StreamArgs {
    pub fn new(cpu_format: impl Into<String>, otw_format: impl Into<String>) -> Self {
        Self {
            cpu_format: cpu_format.into(),
            otw_format: otw_format.into(),
            args: DeviceAddr::new(),
            channels: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: impl Into<Vec<usize>>) -> Self {
        self.channels = channels.into();
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key, value);
        self
    }

    /// The channel list with the empty-means-zero default applied.
    pub fn effective_channels(&self) -> Vec<usize> {
        if self.channels.is_empty() {
            vec![0]
        } else {
            self.channels.clone()
        }
    }
}

impl fmt::Display for StreamArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CPU format: {}, OTW format: {}, channels: {:?}",
            self.cpu_format,
            self.otw_format,
            self.effective_channels()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_constructors() {
        let cmd = StreamCommand::num_samps_and_done(4096);
        assert_eq!(cmd.mode, StreamMode::NumSampsAndDone);
        assert_eq!(cmd.num_samps, 4096);
        assert!(cmd.stream_now);

        let timed = StreamCommand::start_continuous().at(TimeSpec::new(5, 0.25));
        assert!(!timed.stream_now);
        assert_eq!(timed.time_spec, TimeSpec::new(5, 0.25));
        assert_eq!(
            timed.to_string(),
            "StartContinuous num_samps=0 at 5.250000000s"
        );
    }

    #[test]
    fn test_stream_args_default_channel() {
        let args = StreamArgs::new("fc32", "sc16");
        assert_eq!(args.effective_channels(), vec![0]);
        let args = args.with_channels([2, 0]).with_arg("spp", "500");
        assert_eq!(args.effective_channels(), vec![2, 0]);
        assert_eq!(args.args.get("spp"), Some("500"));
    }
}
