//! DC blocker, noise suppression, automatic gain and peak limiter

use serde::{Deserialize, Serialize};

use crate::dsp::noise::{NoiseSuppressor, SuppressionLevel};
use crate::dsp::VoicePreprocessor;

const MIN_DB: f32 = -100.0;

/// Noise suppression preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Strongest reduction, for loud fans and street noise
    Aggressive,
    #[default]
    Standard,
    /// Light touch, keeps more room tone
    Conservative,
}

impl ProcessingMode {
    fn suppression(self) -> SuppressionLevel {
        match self {
            Self::Aggressive => SuppressionLevel::High,
            Self::Standard => SuppressionLevel::Medium,
            Self::Conservative => SuppressionLevel::Low,
        }
    }
}

/// Levels observed on the last processed frame
#[derive(Debug, Clone, Copy)]
pub struct ProcessorStats {
    pub input_level_db: f32,
    pub output_level_db: f32,
    pub gain_db: f32,
    /// Tracked noise floor
    pub noise_level_db: f32,
    /// Samples the limiter pulled down since creation
    pub limited_samples: u64,
}

/// Speech conditioning chain
#[derive(Debug, Clone)]
pub struct VoiceProcessor {
    pub ns_enabled: bool,
    pub agc_enabled: bool,
    pub limiter_enabled: bool,
    /// AGC target RMS level
    pub target_level_db: f32,
    pub min_gain_db: f32,
    pub max_gain_db: f32,
    /// Limiter ceiling, linear
    pub threshold: f32,

    mode: ProcessingMode,
    noise: NoiseSuppressor,
    dc_alpha: f32,
    dc_offset: f32,
    current_gain: f32,
    envelope: f32,
    release: f32,
    input_level_db: f32,
    output_level_db: f32,
    limited_samples: u64,
}

impl Default for VoiceProcessor {
    fn default() -> Self {
        Self {
            ns_enabled: true,
            agc_enabled: true,
            limiter_enabled: true,
            target_level_db: -18.0,
            min_gain_db: -10.0,
            max_gain_db: 20.0,
            threshold: 0.9,
            mode: ProcessingMode::default(),
            noise: NoiseSuppressor::new(ProcessingMode::default().suppression()),
            dc_alpha: 0.995,
            dc_offset: 0.0,
            current_gain: 1.0,
            envelope: 0.0,
            release: 0.999,
            input_level_db: MIN_DB,
            output_level_db: MIN_DB,
            limited_samples: 0,
        }
    }
}

impl VoiceProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: ProcessingMode) -> Self {
        let mut processor = Self::default();
        processor.set_mode(mode);
        processor
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Switch the suppression preset; the learned noise floor is kept
    pub fn set_mode(&mut self, mode: ProcessingMode) {
        self.mode = mode;
        self.noise.set_level(mode.suppression());
    }

    /// Seed the noise floor from a frame of background noise only
    pub fn calibrate_noise(&mut self, frame: &[f32]) {
        self.noise.calibrate(frame);
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            input_level_db: self.input_level_db,
            output_level_db: self.output_level_db,
            gain_db: 20.0 * (self.current_gain + 1e-10).log10(),
            noise_level_db: (20.0 * (self.noise.noise_estimate() + 1e-10).log10()).max(MIN_DB),
            limited_samples: self.limited_samples,
        }
    }

    fn remove_dc(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            self.dc_offset = self.dc_alpha * self.dc_offset + (1.0 - self.dc_alpha) * *sample;
            *sample -= self.dc_offset;
        }
    }

    fn apply_gain(&mut self, frame: &mut [f32]) {
        let level = rms_db(frame);
        if level <= MIN_DB {
            return;
        }

        let desired_db = (self.target_level_db - level).clamp(self.min_gain_db, self.max_gain_db);
        let target = 10f32.powf(desired_db / 20.0);
        // Attack faster than release so bursts are caught quickly
        let alpha = if target > self.current_gain { 0.1 } else { 0.01 };
        self.current_gain = alpha * target + (1.0 - alpha) * self.current_gain;

        for sample in frame.iter_mut() {
            *sample *= self.current_gain;
        }
    }

    fn limit(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            let magnitude = sample.abs();
            self.envelope = if magnitude > self.envelope {
                magnitude
            } else {
                self.release * self.envelope + (1.0 - self.release) * magnitude
            };

            if self.envelope > self.threshold {
                *sample *= self.threshold / self.envelope;
                self.limited_samples += 1;
            }
        }
    }
}

impl VoicePreprocessor for VoiceProcessor {
    fn process(&mut self, frame: &mut [f32]) {
        if frame.is_empty() {
            return;
        }

        self.remove_dc(frame);
        self.input_level_db = rms_db(frame);

        if self.ns_enabled {
            self.noise.process(frame);
        }
        if self.agc_enabled {
            self.apply_gain(frame);
        }
        if self.limiter_enabled {
            self.limit(frame);
        }

        self.output_level_db = rms_db(frame);
    }
}

/// RMS level in dBFS
pub fn rms_db(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return MIN_DB;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    let rms = (sum / frame.len() as f32).sqrt();
    (20.0 * (rms + 1e-10).log10()).max(MIN_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 48000.0).sin() * amplitude)
            .collect()
    }

    fn white_noise(seed: &mut u32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((*seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn suppression_only() -> VoiceProcessor {
        VoiceProcessor {
            agc_enabled: false,
            limiter_enabled: false,
            ..VoiceProcessor::default()
        }
    }

    #[test]
    fn test_background_noise_is_reduced() {
        let mut processor = suppression_only();
        let mut seed = 3;

        for _ in 0..50 {
            let mut frame = white_noise(&mut seed, 0.005, 240);
            processor.process(&mut frame);
        }

        let noise = white_noise(&mut seed, 0.005, 240);
        let mut frame = noise.clone();
        processor.process(&mut frame);
        assert!(rms_db(&frame) < rms_db(&noise) - 6.0);
        assert!(processor.stats().noise_level_db > MIN_DB);
    }

    #[test]
    fn test_tone_survives_suppression() {
        let mut processor = suppression_only();
        let mut seed = 5;
        processor.calibrate_noise(&white_noise(&mut seed, 0.005, 240));

        let noise = white_noise(&mut seed, 0.005, 240);
        let speech: Vec<f32> = sine(0.3, 240).iter().zip(&noise).map(|(t, n)| t + n).collect();
        let mut frame = speech.clone();
        processor.process(&mut frame);

        // Within 1 dB of the input
        assert!((rms_db(&frame) - rms_db(&speech)).abs() < 1.0);
    }

    #[test]
    fn test_suppression_toggle() {
        let mut processor = VoiceProcessor {
            ns_enabled: false,
            ..suppression_only()
        };
        let mut seed = 11;
        processor.calibrate_noise(&white_noise(&mut seed, 0.005, 240));

        let noise = white_noise(&mut seed, 0.005, 240);
        let mut frame = noise.clone();
        processor.process(&mut frame);

        // Only the DC blocker touched the frame
        assert!((rms_db(&frame) - rms_db(&noise)).abs() < 0.5);
    }

    #[test]
    fn test_mode_selects_strength() {
        let mut seed = 13;
        let calibration = white_noise(&mut seed, 0.005, 240);
        let speech: Vec<f32> = sine(0.02, 240)
            .iter()
            .zip(white_noise(&mut seed, 0.005, 240))
            .map(|(t, n)| t + n)
            .collect();

        let mut levels = Vec::new();
        for mode in [ProcessingMode::Conservative, ProcessingMode::Aggressive] {
            let mut processor = suppression_only();
            processor.set_mode(mode);
            processor.calibrate_noise(&calibration);
            let mut frame = speech.clone();
            processor.process(&mut frame);
            levels.push(rms_db(&frame));
        }

        assert!(levels[1] < levels[0]);
        assert_eq!(
            VoiceProcessor::with_mode(ProcessingMode::Aggressive).mode(),
            ProcessingMode::Aggressive
        );
    }

    #[test]
    fn test_limiter_caps_peaks() {
        let mut processor = VoiceProcessor {
            agc_enabled: false,
            ..VoiceProcessor::default()
        };
        let mut frame = vec![1.5f32; 240];
        processor.process(&mut frame);

        assert!(frame.iter().all(|s| s.abs() <= 0.9 + 1e-4));
        assert!(processor.stats().limited_samples > 0);
    }

    #[test]
    fn test_agc_raises_quiet_speech() {
        // A steady quiet tone would be learned as noise floor
        let mut processor = VoiceProcessor {
            ns_enabled: false,
            ..VoiceProcessor::default()
        };
        let quiet = sine(0.01, 240);
        let before = rms_db(&quiet);

        let mut frame = quiet.clone();
        for _ in 0..50 {
            frame.copy_from_slice(&quiet);
            processor.process(&mut frame);
        }

        assert!(rms_db(&frame) > before + 6.0);
        assert!(processor.stats().gain_db <= 20.0 + 1e-3);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut processor = VoiceProcessor::new();
        let mut frame = vec![0.0f32; 240];
        processor.process(&mut frame);
        assert!(frame.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_rms_db_full_scale() {
        let frame = vec![1.0f32; 16];
        assert!(rms_db(&frame).abs() < 1e-3);
        assert_eq!(rms_db(&[]), MIN_DB);
    }
}
