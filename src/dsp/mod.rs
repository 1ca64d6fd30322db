//! Voice preprocessing applied to captured PCM before encoding

pub mod noise;
pub mod processor;

pub use noise::{NoiseSuppressor, SuppressionLevel};
pub use processor::{ProcessingMode, ProcessorStats, VoiceProcessor};

/// In-place PCM stage run inside the capture callback. Must not block or
/// allocate per frame.
pub trait VoicePreprocessor: Send {
    fn process(&mut self, frame: &mut [f32]);
}
