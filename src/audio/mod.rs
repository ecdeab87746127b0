//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod vad;

#[cfg(feature = "stream-host")]
pub mod device;
#[cfg(feature = "stream-host")]
pub mod stream;

pub use buffer::{PacketQueue, SampleRing};
pub use capture::{CaptureControls, CapturePipeline, CaptureStats};
pub use vad::{rms_level, VoiceActivityDetector};

#[cfg(feature = "stream-host")]
pub use device::{list_devices, DeviceInfo};
#[cfg(feature = "stream-host")]
pub use stream::{StreamHost, StreamMode};
