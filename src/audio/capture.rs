//! Audio capture from the default input device
//!
//! The cpal stream lives on its own thread for as long as the capture runs.
//! Hardware periods are downmixed to mono and re-blocked so the registered
//! callback always sees exactly one frame.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::AudioDevice;
use crate::audio::driver::CaptureCallback;
use crate::error::AudioError;

/// How long `start` waits for the stream thread to come up
pub(crate) const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Re-blocks interleaved hardware periods into mono frames of fixed size
pub struct FrameAssembler {
    frame_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, channels: u16) -> Self {
        Self {
            frame_size,
            channels: channels.max(1) as usize,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Feed one interleaved period; `emit` runs once per completed frame
    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(&[f32])) {
        let scale = 1.0 / self.channels as f32;
        for group in interleaved.chunks_exact(self.channels) {
            let mono = if self.channels == 1 {
                group[0]
            } else {
                group.iter().sum::<f32>() * scale
            };
            self.pending.push(mono);

            if self.pending.len() == self.frame_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the next frame boundary
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Running input stream
pub struct AudioCapture {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    frames_captured: Arc<AtomicU64>,
    config: StreamConfig,
}

impl AudioCapture {
    /// Build the input stream on a dedicated thread and start it.
    /// Returns once the stream is playing, or with the build error.
    pub fn start(
        device: AudioDevice,
        config: StreamConfig,
        frame_size: usize,
        mut callback: CaptureCallback,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let frames_captured = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running_for_loop = running.clone();
        let frames = frames_captured.clone();
        let stream_config = config.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let mut assembler = FrameAssembler::new(frame_size, stream_config.channels);

                let stream = cpal_device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        assembler.push(data, |frame| {
                            frames.fetch_add(1, Ordering::Relaxed);
                            callback(frame);
                        });
                    },
                    move |err| {
                        tracing::warn!(error = %err, "Capture stream error");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping capture
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut capture = Self {
            running,
            thread_handle: Some(handle),
            frames_captured,
            config,
        };

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!(
                    channels = capture.config.channels,
                    sample_rate = capture.config.sample_rate.0,
                    "Capture stream started"
                );
                Ok(capture)
            }
            Ok(Err(e)) => {
                capture.stop();
                Err(e)
            }
            Err(_) => {
                capture.stop();
                Err(AudioError::StartTimeout)
            }
        }
    }

    /// Stop capturing and join the stream thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_exact_frames() {
        let mut assembler = FrameAssembler::new(4, 1);
        let mut frames = Vec::new();
        assembler.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(assembler.pending(), 2);

        assembler.push(&[7.0, 8.0], |f| frames.push(f.to_vec()));
        assert_eq!(frames[1], vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_assembler_downmixes_stereo() {
        let mut assembler = FrameAssembler::new(2, 2);
        let mut frames = Vec::new();
        assembler.push(&[1.0, 0.0, 0.5, 0.5], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![0.5, 0.5]]);
    }
}
