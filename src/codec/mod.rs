//! Speech codec boundary
//!
//! The transport treats encoded frames as opaque bytes. Encoding runs inside
//! the capture callback, decoding on the network thread.

pub mod decoder;
pub mod encoder;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;

use bytes::Bytes;

use crate::error::CodecError;

/// PCM frame to compressed bytes
pub trait FrameEncoder: Send {
    /// Encode exactly one frame. An error or an empty result means the frame
    /// is skipped.
    fn encode(&mut self, frame: &[f32]) -> Result<Bytes, CodecError>;
}

/// Compressed bytes to PCM frame
pub trait FrameDecoder: Send {
    /// Decode one packet into at most one frame of samples. An error or an
    /// empty result means the packet is skipped.
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError>;
}
