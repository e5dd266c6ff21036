//! Host and wire sample encodings
//!
//! All formats are complex (I/Q interleaved). The byte width of one complex
//! sample in host memory is the single source of truth for buffer sizing.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::StreamArgs;

/// Host-side (CPU) sample encoding, native endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFormat {
    Fc64,
    Fc32,
    Sc16,
    Sc8,
}

impl HostFormat {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "fc64" => Ok(Self::Fc64),
            "fc32" => Ok(Self::Fc32),
            "sc16" => Ok(Self::Sc16),
            "sc8" => Ok(Self::Sc8),
            other => Err(Error::UnsupportedFormat(format!("cpu format {other:?}"))),
        }
    }

    /// Bytes of one real component (I or Q).
    pub fn element_size(self) -> usize {
        match self {
            Self::Fc64 => 8,
            Self::Fc32 => 4,
            Self::Sc16 => 2,
            Self::Sc8 => 1,
        }
    }

    /// Bytes of one complex sample.
    pub fn bytes_per_sample(self) -> usize {
        2 * self.element_size()
    }

    /// Write one sample with components in `[-1, 1]` into `out`.
    pub fn write_sample(self, out: &mut [u8], i: f64, q: f64) {
        let width = self.element_size();
        self.write_component(&mut out[..width], i);
        self.write_component(&mut out[width..2 * width], q);
    }

    /// Read one sample back as components scaled to `[-1, 1]`.
    pub fn read_sample(self, bytes: &[u8]) -> (f64, f64) {
        let width = self.element_size();
        (
            self.read_component(&bytes[..width]),
            self.read_component(&bytes[width..2 * width]),
        )
    }

    fn write_component(self, out: &mut [u8], value: f64) {
        let value = value.clamp(-1.0, 1.0);
        match self {
            Self::Fc64 => out.copy_from_slice(&value.to_ne_bytes()),
            Self::Fc32 => out.copy_from_slice(&(value as f32).to_ne_bytes()),
            Self::Sc16 => out.copy_from_slice(&((value * i16::MAX as f64).round() as i16).to_ne_bytes()),
            Self::Sc8 => out.copy_from_slice(&((value * i8::MAX as f64).round() as i8).to_ne_bytes()),
        }
    }

    fn read_component(self, bytes: &[u8]) -> f64 {
        match self {
            Self::Fc64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                f64::from_ne_bytes(raw)
            }
            Self::Fc32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                f32::from_ne_bytes(raw) as f64
            }
            Self::Sc16 => {
                let mut raw = [0u8; 2];
                raw.copy_from_slice(bytes);
                i16::from_ne_bytes(raw) as f64 / i16::MAX as f64
            }
            Self::Sc8 => i8::from_ne_bytes([bytes[0]]) as f64 / i8::MAX as f64,
        }
    }
}

impl fmt::Display for HostFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fc64 => "fc64",
            Self::Fc32 => "fc32",
            Self::Sc16 => "sc16",
            Self::Sc8 => "sc8",
        };
        f.write_str(s)
    }
}

/// Over-the-wire sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Sc16,
    Sc12,
    Sc8,
}

impl WireFormat {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "sc16" => Ok(Self::Sc16),
            "sc12" => Ok(Self::Sc12),
            "sc8" => Ok(Self::Sc8),
            other => Err(Error::UnsupportedFormat(format!("wire format {other:?}"))),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Sc16 => 16,
            Self::Sc12 => 12,
            Self::Sc8 => 8,
        }
    }

    /// Bytes one complex sample occupies on the wire.
    pub fn wire_bytes_per_sample(self) -> f64 {
        2.0 * self.bits() as f64 / 8.0
    }

    /// Round a component in `[-1, 1]` to what survives the wire.
    pub fn quantize(self, value: f64) -> f64 {
        let full_scale = ((1u32 << (self.bits() - 1)) - 1) as f64;
        (value.clamp(-1.0, 1.0) * full_scale).round() / full_scale
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sc16 => "sc16",
            Self::Sc12 => "sc12",
            Self::Sc8 => "sc8",
        };
        f.write_str(s)
    }
}

/// Payload bytes in one transport packet.
const MAX_PAYLOAD_BYTES: f64 = 8000.0;

/// The host/wire pair a streamer is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub host: HostFormat,
    pub wire: WireFormat,
}

impl SampleFormat {
    pub fn from_args(args: &StreamArgs) -> Result<Self> {
        Ok(Self {
            host: HostFormat::parse(&args.cpu_format)?,
            wire: WireFormat::parse(&args.otw_format)?,
        })
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.host.bytes_per_sample()
    }

    /// Samples per packet: the `spp` stream argument if given, else what
    /// fits in one payload on the wire.
    pub fn samples_per_packet(&self, args: &StreamArgs) -> Result<usize> {
        let max = (MAX_PAYLOAD_BYTES / self.wire.wire_bytes_per_sample()) as usize;
        match args.args.get("spp") {
            Some(raw) => {
                let spp: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidParameter(format!("spp {raw:?} is not a count")))?;
                if spp == 0 || spp > max {
                    return Err(Error::InvalidParameter(format!(
                        "spp {spp} must be within 1..={max} for {}",
                        self.wire
                    )));
                }
                Ok(spp)
            }
            None => Ok(max),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {}", self.host, self.wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_widths() {
        assert_eq!(HostFormat::Fc64.bytes_per_sample(), 16);
        assert_eq!(HostFormat::Fc32.bytes_per_sample(), 8);
        assert_eq!(HostFormat::Sc16.bytes_per_sample(), 4);
        assert_eq!(HostFormat::Sc8.bytes_per_sample(), 2);
        assert!(HostFormat::parse("fc16").is_err());
    }

    #[test]
    fn test_write_read_sample() {
        for format in [HostFormat::Fc64, HostFormat::Fc32, HostFormat::Sc16] {
            let mut buf = vec![0u8; format.bytes_per_sample()];
            format.write_sample(&mut buf, 0.5, -0.25);
            let (i, q) = format.read_sample(&buf);
            assert!((i - 0.5).abs() < 1e-3, "{format}: i={i}");
            assert!((q + 0.25).abs() < 1e-3, "{format}: q={q}");
        }
    }

    #[test]
    fn test_wire_quantize() {
        let coarse = WireFormat::Sc8.quantize(0.1234);
        let fine = WireFormat::Sc16.quantize(0.1234);
        assert!((fine - 0.1234).abs() < (coarse - 0.1234).abs() + 1e-12);
        assert_eq!(WireFormat::Sc16.quantize(2.0), 1.0);
    }

    #[test]
    fn test_samples_per_packet() {
        let args = StreamArgs::new("fc32", "sc16");
        let format = SampleFormat::from_args(&args).unwrap();
        assert_eq!(format.samples_per_packet(&args).unwrap(), 2000);

        let sc8 = StreamArgs::new("fc32", "sc8");
        let format8 = SampleFormat::from_args(&sc8).unwrap();
        assert_eq!(format8.samples_per_packet(&sc8).unwrap(), 4000);

        let custom = args.clone().with_arg("spp", "512");
        assert_eq!(format.samples_per_packet(&custom).unwrap(), 512);
        let bad = args.with_arg("spp", "0");
        assert!(format.samples_per_packet(&bad).is_err());
    }
}
