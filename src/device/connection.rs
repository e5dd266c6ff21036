//! Shared owner of the driver connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::diagnostics::DiagnosticSink;
use crate::driver::RadioDriver;
use crate::error::{Error, Result};

/// The connection to one radio unit.
///
/// Held by the [`DeviceHandle`](super::DeviceHandle) and by every
/// streamer or controller derived from it; the driver is released when the
/// last holder goes away.
pub(crate) struct DeviceCore {
    driver: Mutex<Box<dyn RadioDriver>>,
    sink: Arc<dyn DiagnosticSink>,
    handle_closed: AtomicBool,
}

impl DeviceCore {
    pub fn new(mut driver: Box<dyn RadioDriver>, sink: Arc<dyn DiagnosticSink>) -> Arc<Self> {
        driver.attach_sink(Arc::clone(&sink));
        Arc::new(Self {
            driver: Mutex::new(driver),
            sink,
            handle_closed: AtomicBool::new(false),
        })
    }

    /// Run `f` with exclusive access to the driver.
    pub fn with_driver<T>(&self, f: impl FnOnce(&mut dyn RadioDriver) -> Result<T>) -> Result<T> {
        let mut driver = self
            .driver
            .lock()
            .map_err(|_| Error::Transport("device connection poisoned".to_string()))?;
        f(driver.as_mut())
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    pub fn mark_handle_closed(&self) {
        self.handle_closed.store(true, Ordering::SeqCst);
    }

    pub fn handle_closed(&self) -> bool {
        self.handle_closed.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceCore {
    fn drop(&mut self) {
        info!("Device connection released");
    }
}

pub(crate) fn check_board(driver: &dyn RadioDriver, board: usize) -> Result<()> {
    let count = driver.board_count();
    if board < count {
        Ok(())
    } else {
        Err(Error::InvalidBoard { index: board, count })
    }
}

pub(crate) fn check_channel(driver: &dyn RadioDriver, chan: usize) -> Result<()> {
    let count = driver.channel_count();
    if chan < count {
        Ok(())
    } else {
        Err(Error::InvalidChannel { index: chan, count })
    }
}
