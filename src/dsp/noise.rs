//! Stationary noise suppression
//!
//! Broadband approximation of spectral subtraction: the noise floor is
//! tracked as an RMS level during quiet frames and every frame is scaled by
//! `max(floor, 1 - alpha * noise / signal)`. Speech well above the floor
//! passes almost untouched; frames near the floor are pulled down.

use crate::dsp::VoicePreprocessor;

/// Suppression strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SuppressionLevel {
    /// Over-subtraction factor
    fn alpha(self) -> f32 {
        match self {
            Self::Low => 1.5,
            Self::Medium => 2.5,
            Self::High => 4.0,
        }
    }

    /// Lowest gain applied, keeps some residual noise instead of gating hard
    fn floor(self) -> f32 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.1,
            Self::High => 0.05,
        }
    }
}

/// Noise floor tracker and attenuator
#[derive(Debug, Clone)]
pub struct NoiseSuppressor {
    level: SuppressionLevel,
    noise_estimate: f32,
    /// Smoothing for the floor estimate, per frame
    smoothing: f32,
    /// Frames below this RMS update the floor estimate
    silence_threshold: f32,
    last_gain: f32,
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new(SuppressionLevel::default())
    }
}

impl NoiseSuppressor {
    pub fn new(level: SuppressionLevel) -> Self {
        Self {
            level,
            noise_estimate: 0.0,
            smoothing: 0.95,
            silence_threshold: 0.02,
            last_gain: 1.0,
        }
    }

    pub fn set_level(&mut self, level: SuppressionLevel) {
        self.level = level;
    }

    /// Seed the floor from a frame known to contain only background noise
    pub fn calibrate(&mut self, noise: &[f32]) {
        if noise.is_empty() {
            return;
        }
        self.noise_estimate = rms(noise);
        tracing::debug!(noise_rms = self.noise_estimate, "Noise floor calibrated");
    }

    /// Current floor estimate, linear RMS
    pub fn noise_estimate(&self) -> f32 {
        self.noise_estimate
    }

    /// Gain applied to the last frame
    pub fn last_gain(&self) -> f32 {
        self.last_gain
    }

    pub fn reset(&mut self) {
        self.noise_estimate = 0.0;
        self.last_gain = 1.0;
    }
}

impl VoicePreprocessor for NoiseSuppressor {
    fn process(&mut self, frame: &mut [f32]) {
        let frame_rms = rms(frame);

        if frame_rms < self.silence_threshold {
            self.noise_estimate =
                self.smoothing * self.noise_estimate + (1.0 - self.smoothing) * frame_rms;
        }

        if self.noise_estimate < 1e-7 {
            self.last_gain = 1.0;
            return;
        }

        let floor = self.level.floor();
        let gain = if frame_rms > 1e-7 {
            (1.0 - self.level.alpha() * self.noise_estimate / frame_rms).max(floor)
        } else {
            floor
        };

        for sample in frame.iter_mut() {
            *sample *= gain;
        }
        self.last_gain = gain;
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic white noise in [-amplitude, amplitude]
    fn white_noise(seed: &mut u32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((*seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn tone(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 48000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_learned_noise_is_attenuated() {
        let mut suppressor = NoiseSuppressor::new(SuppressionLevel::Medium);
        let mut seed = 1;

        for _ in 0..50 {
            let mut frame = white_noise(&mut seed, 0.005, 240);
            suppressor.process(&mut frame);
        }

        let noise = white_noise(&mut seed, 0.005, 240);
        let mut processed = noise.clone();
        suppressor.process(&mut processed);
        assert!(rms(&processed) < rms(&noise) * 0.25);
    }

    #[test]
    fn test_tone_passes_over_calibrated_noise() {
        let mut suppressor = NoiseSuppressor::new(SuppressionLevel::High);
        let mut seed = 7;
        suppressor.calibrate(&white_noise(&mut seed, 0.005, 240));

        let noise = white_noise(&mut seed, 0.005, 240);
        let speech: Vec<f32> = tone(0.3, 240).iter().zip(&noise).map(|(t, n)| t + n).collect();
        let mut processed = speech.clone();
        suppressor.process(&mut processed);

        assert!(rms(&processed) > rms(&speech) * 0.9);
        assert!(suppressor.last_gain() > 0.9);
    }

    #[test]
    fn test_no_estimate_leaves_frame_alone() {
        let mut suppressor = NoiseSuppressor::default();
        let original = tone(0.5, 240);
        let mut frame = original.clone();
        suppressor.process(&mut frame);
        assert_eq!(frame, original);

        suppressor.calibrate(&[0.01; 240]);
        assert!(suppressor.noise_estimate() > 0.0);
        suppressor.reset();
        assert_eq!(suppressor.noise_estimate(), 0.0);
    }

    #[test]
    fn test_levels_order() {
        assert!(SuppressionLevel::High.alpha() > SuppressionLevel::Low.alpha());
        assert!(SuppressionLevel::High.floor() < SuppressionLevel::Low.floor());
    }
}
