//! Audio anomaly detection over a rolling level window.
//!
//! Variance plus transition counting is a cheap proxy for more than one
//! active speaker — two alternating voices swing the level far more than
//! one person reading a ballot aloud. No speech-source separation runs.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::AudioSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDetectorConfig {
    /// Rolling window size in samples (~2s at the 100ms sampling period).
    pub window_size: usize,
    /// Minimum samples before the window is judged at all.
    pub min_samples: usize,
    /// Level variance above this flags a multiple-voices candidate.
    pub variance_threshold: f32,
    /// Adjacent-sample level jump that counts as one transition.
    pub transition_delta: f32,
    /// More transitions than this flags a multiple-voices candidate.
    pub max_transitions: u32,
    /// Instantaneous level above this is reported as high ambient noise.
    pub high_noise_level: f32,
}

impl Default for AudioDetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_samples: 10,
            variance_threshold: 300.0,
            transition_delta: 20.0,
            max_transitions: 3,
            high_noise_level: 70.0,
        }
    }
}

/// What one pushed sample looked like against the current window.
#[derive(Debug, Clone, Copy)]
pub struct AudioAssessment {
    pub level: f32,
    /// Multiple-voices candidate — escalates through the policy engine.
    pub anomaly: bool,
    /// Informational only; never enters the block path.
    pub high_noise: bool,
    pub variance: f32,
    pub transitions: u32,
}

pub struct AudioAnomalyDetector {
    cfg: AudioDetectorConfig,
    window: VecDeque<f32>,
}

impl AudioAnomalyDetector {
    pub fn new(cfg: AudioDetectorConfig) -> Self {
        Self {
            cfg,
            window: VecDeque::with_capacity(cfg.window_size),
        }
    }

    pub fn push(&mut self, sample: &AudioSample) -> AudioAssessment {
        if self.window.len() == self.cfg.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample.level);

        let high_noise = sample.level > self.cfg.high_noise_level;

        if self.window.len() < self.cfg.min_samples {
            return AudioAssessment {
                level: sample.level,
                anomaly: false,
                high_noise,
                variance: 0.0,
                transitions: 0,
            };
        }

        let variance = self.variance();
        let transitions = self.transitions();
        let anomaly =
            variance > self.cfg.variance_threshold || transitions > self.cfg.max_transitions;

        AudioAssessment {
            level: sample.level,
            anomaly,
            high_noise,
            variance,
            transitions,
        }
    }

    fn variance(&self) -> f32 {
        let n = self.window.len() as f32;
        let mean: f32 = self.window.iter().sum::<f32>() / n;
        self.window.iter().map(|l| (l - mean) * (l - mean)).sum::<f32>() / n
    }

    fn transitions(&self) -> u32 {
        let mut count = 0;
        let mut prev: Option<f32> = None;
        for &level in &self.window {
            if let Some(p) = prev {
                if (level - p).abs() > self.cfg.transition_delta {
                    count += 1;
                }
            }
            prev = Some(level);
        }
        count
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(level: f32) -> AudioSample {
        AudioSample {
            timestamp: Utc::now(),
            level,
        }
    }

    fn push_all(detector: &mut AudioAnomalyDetector, levels: &[f32]) -> AudioAssessment {
        let mut last = None;
        for &level in levels {
            last = Some(detector.push(&sample(level)));
        }
        last.expect("at least one sample")
    }

    #[test]
    fn test_alternating_levels_flag_anomaly() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig::default());
        let levels: Vec<f32> = (0..20).map(|i| if i % 2 == 0 { 10.0 } else { 90.0 }).collect();
        let assessment = push_all(&mut detector, &levels);
        assert!(assessment.variance > 300.0);
        assert!(assessment.transitions > 3);
        assert!(assessment.anomaly);
    }

    #[test]
    fn test_flat_window_is_clean() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig::default());
        let assessment = push_all(&mut detector, &[20.0; 20]);
        assert_eq!(assessment.variance, 0.0);
        assert_eq!(assessment.transitions, 0);
        assert!(!assessment.anomaly);
    }

    #[test]
    fn test_no_judgement_below_min_samples() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig::default());
        // 9 wildly alternating samples: window not yet judged.
        let levels: Vec<f32> = (0..9).map(|i| if i % 2 == 0 { 0.0 } else { 100.0 }).collect();
        let assessment = push_all(&mut detector, &levels);
        assert!(!assessment.anomaly);
    }

    #[test]
    fn test_high_noise_is_instantaneous_and_separate() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig::default());
        push_all(&mut detector, &[20.0; 19]);
        let assessment = detector.push(&sample(85.0));
        assert!(assessment.high_noise);
        // One loud sample in a flat window is not a voices anomaly.
        assert!(!assessment.anomaly);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig::default());
        // Noisy prefix scrolls fully out of the 20-sample window.
        let mut levels: Vec<f32> = (0..20).map(|i| if i % 2 == 0 { 10.0 } else { 90.0 }).collect();
        levels.extend(std::iter::repeat(50.0).take(20));
        let assessment = push_all(&mut detector, &levels);
        assert!(!assessment.anomaly);
    }

    #[test]
    fn test_transitions_alone_trigger() {
        let mut detector = AudioAnomalyDetector::new(AudioDetectorConfig {
            variance_threshold: f32::MAX,
            ..AudioDetectorConfig::default()
        });
        let levels: Vec<f32> = (0..20).map(|i| if i % 2 == 0 { 30.0 } else { 55.0 }).collect();
        let assessment = push_all(&mut detector, &levels);
        assert!(assessment.transitions > 3);
        assert!(assessment.anomaly);
    }
}
