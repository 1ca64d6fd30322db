//! Audio device lookup

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, StreamConfig, SupportedBufferSize};

use crate::error::AudioError;

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
    pub is_input: bool,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device, is_input: bool) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
            is_input,
        }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Stream config at `sample_rate`, keeping the device's native channel
    /// count and asking for `frame_size` sample periods when supported
    pub fn stream_config(
        &self,
        sample_rate: u32,
        frame_size: usize,
    ) -> Result<StreamConfig, AudioError> {
        let default = if self.is_input {
            self.inner.default_input_config()
        } else {
            self.inner.default_output_config()
        }
        .map_err(|e| AudioError::DeviceNotFound(format!("{}: {}", self.name, e)))?;

        if default.sample_format() != cpal::SampleFormat::F32 {
            tracing::debug!(
                device = %self.name,
                format = ?default.sample_format(),
                "Device default is not f32, requesting f32 anyway"
            );
        }

        let period = frame_size as u32;
        let buffer_size = match default.buffer_size() {
            SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&period) => {
                BufferSize::Fixed(period)
            }
            _ => BufferSize::Default,
        };

        Ok(StreamConfig {
            channels: default.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size,
        })
    }
}

/// Get default input device
pub fn get_default_input_device() -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    host.default_input_device()
        .map(|d| AudioDevice::from_cpal(d, true))
        .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
}

/// Get default output device
pub fn get_default_output_device() -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    host.default_output_device()
        .map(|d| AudioDevice::from_cpal(d, false))
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}
