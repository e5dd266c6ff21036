//! Spectrum RX - multi-channel SDR receive control and sample streaming
//!
//! A [`DeviceHandle`] opens a receiver (one or more boards, each exposing
//! one or more receive channels), configures time, clock references,
//! tuning, gain, antennas and bandwidth, and hands out a
//! [`StreamController`] for acquisition commands and [`SampleStreamer`]s for
//! blocking sample delivery. Hardware backends plug in under
//! [`driver::RadioDriver`]; an in-tree simulated receiver is opened with
//! `type=sim`.
//!
//! The [`capture`] and [`config`] modules drive the band-scan service
//! shipped as the `spectrum-rx` binary.

pub mod capture;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod stream;
pub mod types;

pub use device::{DeviceHandle, SensorScope};
pub use diagnostics::{DiagnosticSink, MessageKind};
pub use error::{Error, Result};
pub use stream::{AcquisitionState, SampleStreamer, StreamController};
pub use types::{
    DeviceAddr, MetaRange, Range, RxErrorCode, RxMetadata, SensorValue, StreamArgs, StreamCommand,
    StreamMode, SubDevSpecPair, TimeSpec, TunePolicy, TuneRequest, TuneResult,
};
