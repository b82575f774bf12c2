//! Face-count pattern analysis over a rolling frame window.
//!
//! Two signals come out of here. `multiple_faces` is instantaneous and
//! feeds the escalation path. `fraud_detected` is the slow accumulator:
//! a face that keeps flickering in and out of frame (someone leaning in,
//! a photo being swapped) raises `suspicious_patterns` until the flag
//! trips. The flag is reported to the controller, it does not block by
//! itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::DetectionSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDetectorConfig {
    /// Rolling window size in frames (~60s at one frame per 2s).
    pub window_size: usize,
    /// Minimum frames before pattern analysis runs.
    pub min_samples: usize,
    /// Minimum gap between analyses, measured on sample timestamps.
    pub analysis_interval_ms: i64,
    /// Face-count changes above this share of the window are suspicious.
    pub change_ratio: f32,
    /// Disappear-and-return cycles at or above this are suspicious.
    pub min_disappearances: u32,
    /// `suspicious_patterns` at or above this trips `fraud_detected`.
    pub fraud_threshold: f32,
    /// How much a clean analysis decays the accumulator.
    pub decay: f32,
    /// Faces below this confidence do not count as a multiple-faces
    /// candidate.
    pub confidence_threshold: f32,
}

impl Default for VideoDetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            min_samples: 5,
            analysis_interval_ms: 3000,
            change_ratio: 0.3,
            min_disappearances: 2,
            fraud_threshold: 3.0,
            decay: 0.5,
            confidence_threshold: 0.75,
        }
    }
}

/// What one pushed frame observation looked like.
#[derive(Debug, Clone, Copy)]
pub struct VideoAssessment {
    pub face_count: u32,
    pub face_detected: bool,
    /// Escalation candidate: more than one confidently-detected face.
    pub multiple_faces: bool,
    /// Accumulated flicker-pattern verdict, informational.
    pub fraud_detected: bool,
    pub suspicious_patterns: f32,
}

pub struct VideoAnomalyDetector {
    cfg: VideoDetectorConfig,
    window: VecDeque<(DateTime<Utc>, u32)>,
    last_analysis: Option<DateTime<Utc>>,
    suspicious_patterns: f32,
    fraud_detected: bool,
}

impl VideoAnomalyDetector {
    pub fn new(cfg: VideoDetectorConfig) -> Self {
        Self {
            cfg,
            window: VecDeque::with_capacity(cfg.window_size),
            last_analysis: None,
            suspicious_patterns: 0.0,
            fraud_detected: false,
        }
    }

    pub fn push(&mut self, sample: &DetectionSample) -> VideoAssessment {
        if self.window.len() == self.cfg.window_size {
            self.window.pop_front();
        }
        self.window.push_back((sample.timestamp, sample.face_count));

        if self.should_analyze(sample.timestamp) {
            self.analyze(sample.timestamp);
        }

        let multiple_faces = sample.face_count > 1
            && sample.face_confidence_min >= self.cfg.confidence_threshold;

        VideoAssessment {
            face_count: sample.face_count,
            face_detected: sample.face_count > 0,
            multiple_faces,
            fraud_detected: self.fraud_detected,
            suspicious_patterns: self.suspicious_patterns,
        }
    }

    fn should_analyze(&self, now: DateTime<Utc>) -> bool {
        if self.window.len() < self.cfg.min_samples {
            return false;
        }
        match self.last_analysis {
            None => true,
            Some(last) => now - last >= Duration::milliseconds(self.cfg.analysis_interval_ms),
        }
    }

    fn analyze(&mut self, now: DateTime<Utc>) {
        self.last_analysis = Some(now);

        let mut face_count_changes = 0u32;
        let mut disappearances = 0u32;
        let mut prev: Option<u32> = None;
        for &(_, count) in &self.window {
            if let Some(p) = prev {
                if p != count {
                    face_count_changes += 1;
                }
                // A zero-face run ending: the face left and came back.
                if p == 0 && count > 0 {
                    disappearances += 1;
                }
            }
            prev = Some(count);
        }

        let change_limit = self.cfg.change_ratio * self.cfg.window_size as f32;
        let mut suspicious_score = 0u32;
        if face_count_changes as f32 > change_limit {
            suspicious_score += 1;
        }
        if disappearances >= self.cfg.min_disappearances {
            suspicious_score += 1;
        }

        if suspicious_score >= 1 {
            self.suspicious_patterns += 1.0;
        } else {
            self.suspicious_patterns = (self.suspicious_patterns - self.cfg.decay).max(0.0);
        }

        if self.suspicious_patterns >= self.cfg.fraud_threshold {
            self.fraud_detected = true;
        }
    }

    pub fn fraud_detected(&self) -> bool {
        self.fraud_detected
    }

    pub fn suspicious_patterns(&self) -> f32 {
        self.suspicious_patterns
    }
}
