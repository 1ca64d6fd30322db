//! Audio playback to the default output device

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::capture::STREAM_READY_TIMEOUT;
use crate::audio::device::AudioDevice;
use crate::audio::driver::PlaybackCallback;
use crate::error::AudioError;

/// Fans a mono callback out to an interleaved output buffer
pub struct MonoFanout {
    channels: usize,
    scratch: Vec<f32>,
}

impl MonoFanout {
    pub fn new(channels: u16, expected_frames: usize) -> Self {
        Self {
            channels: channels.max(1) as usize,
            scratch: vec![0.0; expected_frames],
        }
    }

    /// Ask `fill` for one mono sample per output frame and copy it to every
    /// channel of `interleaved`
    pub fn fill(&mut self, interleaved: &mut [f32], mut fill: impl FnMut(&mut [f32])) {
        if self.channels == 1 {
            fill(interleaved);
            return;
        }

        let frames = interleaved.len() / self.channels;
        if self.scratch.len() < frames {
            self.scratch.resize(frames, 0.0);
        }
        let mono = &mut self.scratch[..frames];
        fill(mono);

        for (group, sample) in interleaved.chunks_exact_mut(self.channels).zip(mono.iter()) {
            group.fill(*sample);
        }
    }
}

/// Running output stream
pub struct AudioPlayback {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioPlayback {
    /// Build the output stream on a dedicated thread and start it
    pub fn start(
        device: AudioDevice,
        config: StreamConfig,
        frame_size: usize,
        mut callback: PlaybackCallback,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let mut fanout = MonoFanout::new(config.channels, frame_size);

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        fanout.fill(data, |mono| callback(mono));
                    },
                    move |err| {
                        tracing::warn!(error = %err, "Playback stream error");
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

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut playback = Self {
            running,
            thread_handle: Some(handle),
        };

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!("Playback stream started");
                Ok(playback)
            }
            Ok(Err(e)) => {
                playback.stop();
                Err(e)
            }
            Err(_) => {
                playback.stop();
                Err(AudioError::StartTimeout)
            }
        }
    }

    /// Stop playback and join the stream thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_mono_passthrough() {
        let mut fanout = MonoFanout::new(1, 4);
        let mut out = [0.0f32; 4];
        fanout.fill(&mut out, |mono| mono.fill(0.25));
        assert_eq!(out, [0.25; 4]);
    }

    #[test]
    fn test_fanout_duplicates_to_stereo() {
        let mut fanout = MonoFanout::new(2, 2);
        let mut out = [0.0f32; 6];
        fanout.fill(&mut out, |mono| {
            assert_eq!(mono.len(), 3);
            mono.copy_from_slice(&[1.0, 2.0, 3.0]);
        });
        assert_eq!(out, [1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }
}
