//! Device handle and its shared connection

pub(crate) mod connection;
mod handle;
mod report;

pub use handle::{DeviceHandle, SensorScope};
