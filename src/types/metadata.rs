//! Per-delivery receive metadata

use std::fmt;

use serde::Serialize;

use super::time::TimeSpec;

/// Why a receive call returned what it did.
///
/// The raw values mirror the device's status codes. They look like bit
/// flags but overlap (`Alignment` = 12, `BadPacket` = 15), so this is a
/// closed set of mutually exclusive conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum RxErrorCode {
    #[default]
    None = 0,
    /// No packet arrived before the timeout.
    Timeout = 1,
    /// A timed stream command was scheduled for a time already in the past.
    LateCommand = 2,
    /// A chained bounded command ran out without a follow-up.
    BrokenChain = 4,
    /// An internal receive buffer filled and samples were dropped.
    Overflow = 8,
    /// Multi-channel alignment failed.
    Alignment = 12,
    /// A packet could not be parsed.
    BadPacket = 15,
}

impl RxErrorCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Timeout),
            2 => Some(Self::LateCommand),
            4 => Some(Self::BrokenChain),
            8 => Some(Self::Overflow),
            12 => Some(Self::Alignment),
            15 => Some(Self::BadPacket),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Expected under load; retry or re-arm.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Timeout | Self::Overflow)
    }

    /// Points at a timing or configuration mistake upstream; re-synchronise
    /// the clocks and restart acquisition instead of retrying blindly.
    pub fn needs_resync(self) -> bool {
        matches!(
            self,
            Self::LateCommand | Self::BrokenChain | Self::Alignment | Self::BadPacket
        )
    }
}

impl fmt::Display for RxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Timeout => "Timeout",
            Self::LateCommand => "LateCommand",
            Self::BrokenChain => "BrokenChain",
            Self::Overflow => "Overflow",
            Self::Alignment => "Alignment",
            Self::BadPacket => "BadPacket",
        };
        f.write_str(s)
    }
}

/// Metadata for one receive call. Built fresh per call and handed to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RxMetadata {
    pub has_time_spec: bool,
    /// Device time of the first sample delivered.
    pub time_spec: TimeSpec,
    /// The current packet continues in the next receive call.
    pub more_fragments: bool,
    /// Sample offset into the packet where this delivery began.
    pub fragment_offset: usize,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
    pub error_code: RxErrorCode,
}

impl RxMetadata {
    /// Metadata carrying only an error condition.
    pub fn error(error_code: RxErrorCode) -> Self {
        Self {
            error_code,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == RxErrorCode::None
    }
}

impl fmt::Display for RxMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HasTimeSpec: {}, TimeSpec: {}, MoreFragments: {}, FragmentOffset: {}, StartOfBurst: {}, EndOfBurst: {}, ErrorCode: {}",
            self.has_time_spec,
            self.time_spec,
            self.more_fragments,
            self.fragment_offset,
            self.start_of_burst,
            self.end_of_burst,
            self.error_code
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_raw_values() {
        for code in [
            RxErrorCode::None,
            RxErrorCode::Timeout,
            RxErrorCode::LateCommand,
            RxErrorCode::BrokenChain,
            RxErrorCode::Overflow,
            RxErrorCode::Alignment,
            RxErrorCode::BadPacket,
        ] {
            assert_eq!(RxErrorCode::from_raw(code.as_raw()), Some(code));
        }
        // overlapping bit patterns are not combinations
        assert_eq!(RxErrorCode::from_raw(3), None);
        assert_eq!(RxErrorCode::Alignment.as_raw(), 12);
    }

    #[test]
    fn test_error_code_policy() {
        assert!(RxErrorCode::Timeout.is_recoverable());
        assert!(RxErrorCode::Overflow.is_recoverable());
        assert!(RxErrorCode::LateCommand.needs_resync());
        assert!(RxErrorCode::BadPacket.needs_resync());
        assert!(!RxErrorCode::None.needs_resync());
    }

    #[test]
    fn test_metadata_json() {
        let md = RxMetadata::error(RxErrorCode::Overflow);
        let json = serde_json::to_value(md).unwrap();
        assert_eq!(json["error_code"], "Overflow");
        assert_eq!(json["has_time_spec"], false);
    }
}
