//! Value types exchanged with the device
//!
//! Immutable descriptors with no behavior beyond construction, formatting
//! and comparison.

mod addr;
mod metadata;
mod range;
mod sensor;
mod stream;
mod subdev;
mod time;
mod tune;

pub use addr::DeviceAddr;
pub use metadata::{RxErrorCode, RxMetadata};
pub use range::{MetaRange, Range};
pub use sensor::SensorValue;
pub use stream::{StreamArgs, StreamCommand, StreamMode};
pub use subdev::{spec_markup, SubDevSpecPair};
pub use time::TimeSpec;
pub use tune::{TunePolicy, TuneRequest, TuneResult};
