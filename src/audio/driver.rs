//! Audio driver boundary
//!
//! The session hands the driver two callbacks: one that receives exactly one
//! mono frame per hardware period, and one that must completely fill the
//! playback buffer. Both run on the driver's real-time thread and must not
//! block.

use crate::audio::capture::AudioCapture;
use crate::audio::device::{get_default_input_device, get_default_output_device, AudioDevice};
use crate::audio::playback::AudioPlayback;
use crate::error::AudioError;

/// Receives one captured frame of `frame_size` mono samples
pub type CaptureCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fills the whole slice with mono samples, padding with silence
pub type PlaybackCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Capture/playback driver owned by a session
pub trait AudioDriver: Send {
    /// Register the callbacks and start the streams. Either may be absent.
    fn start(
        &mut self,
        capture: Option<CaptureCallback>,
        playback: Option<PlaybackCallback>,
    ) -> Result<(), AudioError>;

    /// Stop the streams and drop the callbacks. Idempotent.
    fn stop(&mut self);
}

/// Driver backed by the default cpal host
pub struct CpalDriver {
    sample_rate: u32,
    frame_size: usize,
    input: Option<AudioDevice>,
    output: Option<AudioDevice>,
    capture: Option<AudioCapture>,
    playback: Option<AudioPlayback>,
}

impl CpalDriver {
    /// Resolve the default devices this session needs. Fails if a required
    /// device is missing or reports no usable configuration.
    pub fn open(
        sample_rate: u32,
        frame_size: usize,
        with_input: bool,
        with_output: bool,
    ) -> Result<Self, AudioError> {
        let input = if with_input {
            let device = get_default_input_device()?;
            device.stream_config(sample_rate, frame_size)?;
            tracing::info!(device = %device.name, "Using input device");
            Some(device)
        } else {
            None
        };

        let output = if with_output {
            let device = get_default_output_device()?;
            device.stream_config(sample_rate, frame_size)?;
            tracing::info!(device = %device.name, "Using output device");
            Some(device)
        } else {
            None
        };

        Ok(Self {
            sample_rate,
            frame_size,
            input,
            output,
            capture: None,
            playback: None,
        })
    }
}

impl AudioDriver for CpalDriver {
    fn start(
        &mut self,
        capture: Option<CaptureCallback>,
        playback: Option<PlaybackCallback>,
    ) -> Result<(), AudioError> {
        if let Some(callback) = playback {
            let device = self
                .output
                .take()
                .ok_or_else(|| AudioError::DeviceNotFound("output device not opened".into()))?;
            let config = device.stream_config(self.sample_rate, self.frame_size)?;
            self.playback = Some(AudioPlayback::start(device, config, self.frame_size, callback)?);
        }

        if let Some(callback) = capture {
            let device = self
                .input
                .take()
                .ok_or_else(|| AudioError::DeviceNotFound("input device not opened".into()))?;
            let config = device.stream_config(self.sample_rate, self.frame_size)?;
            match AudioCapture::start(device, config, self.frame_size, callback) {
                Ok(capture) => self.capture = Some(capture),
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            tracing::debug!(frames = capture.frames_captured(), "Capture stopped");
        }
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
            tracing::debug!("Playback stopped");
        }
        self.input = None;
        self.output = None;
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
