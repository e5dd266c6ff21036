//! Acquisition control and sample delivery

mod controller;
mod format;
mod state;
mod streamer;

pub use controller::StreamController;
pub use format::{HostFormat, SampleFormat, WireFormat};
pub use state::{AcquisitionState, Consumed, Transition};
pub use streamer::SampleStreamer;
