//! Opus encoder wrapper
//!
//! Configured for low-latency speech: mono, fixed frame size, constant
//! bitrate unless VBR is requested.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::codec::FrameEncoder;
use crate::config::{OpusApplication, OpusConfig};
use crate::constants::MAX_ENCODED_FRAME;
use crate::error::CodecError;

/// Opus encoder wrapper
pub struct OpusEncoder {
    encoder: Encoder,
    config: OpusConfig,
    frame_size: usize,
    channels: u16,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a new Opus encoder for `frame_size` samples per channel
    pub fn new(
        config: OpusConfig,
        sample_rate: u32,
        channels: u16,
        frame_size: usize,
    ) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::EncoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let application = match config.application {
            OpusApplication::Voip => Application::Voip,
            OpusApplication::Audio => Application::Audio,
            OpusApplication::LowDelay => Application::LowDelay,
        };

        let mut encoder = Encoder::new(sample_rate, opus_channels, application)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        Self::configure_encoder(&mut encoder, &config)?;

        Ok(Self {
            encoder,
            config,
            frame_size,
            channels,
            encode_buffer: vec![0u8; MAX_ENCODED_FRAME],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    fn configure_encoder(encoder: &mut Encoder, config: &OpusConfig) -> Result<(), CodecError> {
        encoder
            .set_bitrate(opus::Bitrate::Bits(config.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        encoder
            .set_vbr(config.vbr)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;

        if config.vbr && config.cvbr {
            encoder
                .set_vbr_constraint(true)
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set CVBR: {}", e)))?;
        }

        encoder
            .set_inband_fec(config.fec)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        encoder
            .set_packet_loss_perc(config.packet_loss_perc as i32)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set packet loss: {}", e)))?;

        Ok(())
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }

    /// Samples per channel per frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total interleaved samples per frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        if samples.len() != self.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_creation() {
        let encoder = OpusEncoder::new(OpusConfig::voice(), 48000, 1, 240).unwrap();
        assert_eq!(encoder.frame_size(), 240);
        assert_eq!(encoder.config().bitrate, 32_000);
    }

    #[test]
    fn test_encoding_silence() {
        let mut encoder = OpusEncoder::new(OpusConfig::voice(), 48000, 1, 240).unwrap();
        let encoded = encoder.encode(&[0.0f32; 240]).unwrap();
        assert!(!encoded.is_empty());
        assert!(encoded.len() <= MAX_ENCODED_FRAME);
        assert_eq!(encoder.stats().frames_encoded, 1);
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let mut encoder = OpusEncoder::new(OpusConfig::voice(), 48000, 1, 240).unwrap();
        assert!(matches!(
            encoder.encode(&[0.0f32; 100]),
            Err(CodecError::InvalidFrameSize(100))
        ));
    }

    #[test]
    fn test_unsupported_channels() {
        assert!(OpusEncoder::new(OpusConfig::voice(), 48000, 3, 240).is_err());
    }
}
