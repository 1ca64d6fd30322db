//! Opus decoder wrapper

use opus::{Channels, Decoder};

use crate::codec::FrameDecoder;
use crate::error::CodecError;

/// Opus decoder wrapper
pub struct OpusDecoder {
    decoder: Decoder,
    channels: u16,
    frame_size: usize,
    /// Decoding buffer sized for one frame
    decode_buffer: Vec<f32>,
    frames_decoded: u64,
    decode_errors: u64,
}

impl OpusDecoder {
    /// Create a decoder producing at most `frame_size` samples per channel
    pub fn new(sample_rate: u32, channels: u16, frame_size: usize) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            channels,
            frame_size,
            decode_buffer: vec![0.0f32; frame_size * channels as usize],
            frames_decoded: 0,
            decode_errors: 0,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let samples = match self.decoder.decode_float(data, &mut self.decode_buffer, false) {
            Ok(samples) => samples,
            Err(e) => {
                self.decode_errors += 1;
                return Err(CodecError::DecodingFailed(e.to_string()));
            }
        };

        let total_samples = samples * self.channels as usize;
        self.frames_decoded += 1;

        Ok(self.decode_buffer[..total_samples].to_vec())
    }
}
