//! Spectrum RX - band scanner
//!
//! Opens a receiver, configures it from the environment, dumps the device
//! report and sweeps the configured band, logging the mean power of every
//! step as JSON.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spectrum_rx::capture::{configure, ScanCapture, ScanRecord};
use spectrum_rx::config::CaptureConfig;
use spectrum_rx::DeviceHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spectrum_rx=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("===========================================");
    info!("   Spectrum RX - band scanner");
    info!("===========================================");

    let config = CaptureConfig::from_env();

    info!("Configuration:");
    info!("  Device address: {}", config.device_addr);
    info!("  Channels: {:?}", config.channels);
    info!("  Rate: {} Hz", config.rate_hz);
    info!("  Bandwidth: {} Hz", config.bandwidth_hz);
    info!("  Gain: {} dB", config.gain_db);
    info!("  Antenna: {}", config.antenna);
    info!("  Formats: {} / {}", config.cpu_format, config.otw_format);

    let device = match DeviceHandle::open(&config.device_addr) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open device: {}", e);
            error!("Set DEVICE_ARG_TYPE=sim to run against the simulated receiver.");
            return Err(e).context("Failed to open device");
        }
    };

    configure(&device, &config).context("Failed to configure device")?;

    for line in device.report().context("Failed to read device report")?.lines() {
        info!("{}", line);
    }

    let capture = Arc::new(ScanCapture::new(config.clone(), device));
    let record_rx = capture.start()?;

    info!("===========================================");
    info!("  Scanning...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let consumer = {
        let capture = capture.clone();
        let interval = config.stats_interval;
        tokio::task::spawn_blocking(move || consume(&capture, record_rx, interval))
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received, shutting down...");
        }
        _ = wait_until_stopped(&capture) => {
            warn!("Band scan stopped unexpectedly");
        }
    }

    capture.stop();
    let records = consumer.await.context("Record consumer panicked")?;

    info!("Shutdown complete. Records logged: {}", records);
    Ok(())
}

async fn wait_until_stopped(capture: &ScanCapture) {
    while capture.is_running() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Log every record as JSON plus periodic statistics until the scan thread
/// hangs up. Returns the number of records logged.
fn consume(capture: &ScanCapture, record_rx: Receiver<ScanRecord>, interval: Duration) -> u64 {
    let mut records = 0u64;
    let mut last_stats = Instant::now();

    loop {
        match record_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(record) => {
                records += 1;
                match serde_json::to_string(&record) {
                    Ok(json) => info!("[Scan] {}", json),
                    Err(e) => warn!("Failed to serialize scan record: {}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_stats.elapsed() >= interval {
            let stats = capture.stats();
            info!(
                "[Stats] Records: {} | Steps: {} | Sweeps: {} | Failed: {} | Dropped: {}",
                records,
                stats.steps_completed.load(Ordering::Relaxed),
                stats.sweeps_completed.load(Ordering::Relaxed),
                stats.failed_steps.load(Ordering::Relaxed),
                stats.records_dropped.load(Ordering::Relaxed)
            );
            last_stats = Instant::now();
        }
    }

    records
}
