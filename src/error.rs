//! Error types for device control and streaming.
//!
//! Only configuration, construction and lifecycle failures are errors.
//! Data-path conditions (timeouts, overflows, late commands, ...) are
//! delivered as data through [`RxMetadata`](crate::types::RxMetadata).

/// The error type for all fallible device and streamer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No hardware answered the given device address.
    #[error("no device found for address: {0}")]
    DeviceNotFound(String),

    /// A device was found but could not be brought up.
    #[error("device initialisation failed: {0}")]
    DeviceInit(String),

    /// The board (motherboard) index does not exist.
    #[error("invalid board index {index} (device has {count} boards)")]
    InvalidBoard { index: usize, count: usize },

    /// The logical channel index does not exist.
    #[error("invalid channel index {index} (device has {count} channels)")]
    InvalidChannel { index: usize, count: usize },

    /// A name, source or spec argument is not one the device knows.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A numeric setting lies outside the legal range.
    #[error("{what} {value} outside legal range [{start}, {stop}]")]
    OutOfRange {
        what: &'static str,
        value: f64,
        start: f64,
        stop: f64,
    },

    /// A manually pinned tuning stage could not be honoured exactly.
    #[error("tune request rejected: {0}")]
    TuneRejected(String),

    /// The named sensor does not exist on the board or channel.
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    /// The host or wire sample format tag is not understood.
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The caller's receive buffer cannot hold the requested samples.
    #[error("receive buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// The handle or streamer has already been released.
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// The link to the device is corrupt or gone.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_out_of_range() {
        let e = Error::OutOfRange {
            what: "gain",
            value: 99.0,
            start: 0.0,
            stop: 51.5,
        };
        assert_eq!(e.to_string(), "gain 99 outside legal range [0, 51.5]");
    }

    #[test]
    fn test_error_display_disposed() {
        assert_eq!(
            Error::Disposed("sample streamer").to_string(),
            "sample streamer has been disposed"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + std::error::Error>() {}
        assert_send_sync::<Error>();
    }
}
