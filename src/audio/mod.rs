//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod driver;
pub mod playback;

pub use buffer::{BoundedQueue, FrameQueues, PlaybackBuffer};
pub use capture::{AudioCapture, FrameAssembler};
pub use driver::{AudioDriver, CaptureCallback, CpalDriver, PlaybackCallback};
pub use playback::AudioPlayback;
