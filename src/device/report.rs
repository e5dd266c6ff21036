//! Human-readable device dump

use std::fmt::Write as _;

use super::{DeviceHandle, SensorScope};
use crate::error::Result;
use crate::types::MetaRange;

fn ranges(out: &mut String, label: &str, ranges: &MetaRange) {
    let _ = writeln!(out, "    {label}:");
    for range in ranges {
        let _ = writeln!(out, "      {range}");
    }
}

/// Render every board and channel the handle can see.
pub(super) fn render(handle: &DeviceHandle) -> Result<String> {
    let mut out = String::new();
    out.push_str(&handle.device_properties()?);
    let _ = writeln!(out);

    let boards = handle.board_count()?;
    let _ = writeln!(out, "Boards: {boards}");
    let _ = writeln!(out, "Time synchronized: {}", handle.is_time_synchronized()?);
    for board in 0..boards {
        let _ = writeln!(out, "  Board {board}: {}", handle.board_name(board)?);
        let _ = writeln!(
            out,
            "    Time source: {} (available: {})",
            handle.time_source(board)?,
            handle.time_sources(board)?.join(", ")
        );
        let _ = writeln!(
            out,
            "    Clock source: {} (available: {})",
            handle.clock_source(board)?,
            handle.clock_sources(board)?.join(", ")
        );
        let _ = writeln!(out, "    Time: {}", handle.time_now(board)?);
        for name in handle.sensor_names(SensorScope::Board(board))? {
            let value = handle.sensor(&name, SensorScope::Board(board))?;
            let _ = writeln!(out, "    Sensor {value}");
        }
        let spec: Vec<String> = handle
            .subdev_spec(board)?
            .iter()
            .map(|pair| pair.to_string())
            .collect();
        let _ = writeln!(out, "    Subdev spec: {}", spec.join(" "));
    }

    let channels = handle.channel_count()?;
    let _ = writeln!(out, "Channels: {channels}");
    for chan in 0..channels {
        let _ = writeln!(out, "  Channel {chan}: {}", handle.subdev_name(chan)?);
        let _ = writeln!(out, "    Rate: {} Hz", handle.rate(chan)?);
        ranges(&mut out, "Front-end frequency range", &handle.frontend_frequency_range(chan)?);
        ranges(&mut out, "Frequency range", &handle.frequency_range(chan)?);
        let _ = writeln!(out, "    Frequency: {} Hz", handle.frequency(chan)?);
        for stage in handle.gain_names(chan)? {
            let range = handle.gain_range(Some(&stage), chan)?;
            let _ = writeln!(
                out,
                "    Gain {stage}: {} dB [{range}]",
                handle.gain(Some(&stage), chan)?
            );
        }
        let _ = writeln!(
            out,
            "    Gain: {} dB [{}]",
            handle.gain(None, chan)?,
            handle.gain_range(None, chan)?
        );
        let _ = writeln!(
            out,
            "    Antenna: {} (available: {})",
            handle.antenna(chan)?,
            handle.antennas(chan)?.join(", ")
        );
        ranges(&mut out, "Bandwidth range", &handle.bandwidth_range(chan)?);
        let _ = writeln!(out, "    Bandwidth: {} Hz", handle.bandwidth(chan)?);
        for name in handle.sensor_names(SensorScope::Channel(chan))? {
            let value = handle.sensor(&name, SensorScope::Channel(chan))?;
            let _ = writeln!(out, "    Sensor {value}");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use crate::types::DeviceAddr;
    use crate::DeviceHandle;

    #[test]
    fn test_report_covers_boards_and_channels() {
        let addr = DeviceAddr::new().with("type", "sim").with("boards", "2");
        let handle = DeviceHandle::open(&addr).unwrap();
        let report = handle.report().unwrap();
        assert!(report.contains("Boards: 2"));
        assert!(report.contains("Board 1: SIM-RX"));
        assert!(report.contains("Channel 1: SIM-6G RX0"));
        assert!(report.contains("Gain LNA"));
        assert!(report.contains("Sensor lo_locked: true locked"));
        assert!(report.contains("Start: 200000, Stop: 56000000, Step: 1"));
    }
}
