//! Anomaly detection over the sampled media streams.
//!
//! Detectors are pure with respect to the timestamped samples they
//! consume: no wall-clock reads, no I/O. That keeps every threshold
//! testable with fabricated timestamps.

pub mod audio;
pub mod video;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::CapturedFrame;

pub use audio::{AudioAnomalyDetector, AudioAssessment, AudioDetectorConfig};
pub use video::{VideoAnomalyDetector, VideoAssessment, VideoDetectorConfig};

/// One instantaneous microphone observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioSample {
    pub timestamp: DateTime<Utc>,
    /// Instantaneous level, 0..100.
    pub level: f32,
}

/// A detected face: normalized box plus detector confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
}

/// One frame-analysis observation, produced locally or remotely,
/// consumed once by the video detector and kept only in its bounded
/// rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSample {
    pub timestamp: DateTime<Utc>,
    pub face_count: u32,
    #[serde(default)]
    pub face_boxes: Vec<FaceBox>,
    #[serde(default)]
    pub liveness_scores: Vec<f32>,
    /// Lowest confidence among the detected faces; 0 when none.
    #[serde(default)]
    pub face_confidence_min: f32,
}

impl DetectionSample {
    /// Lowest liveness score in the sample, if any face was scored.
    pub fn min_liveness(&self) -> Option<f32> {
        self.liveness_scores
            .iter()
            .copied()
            .fold(None, |min, s| match min {
                None => Some(s),
                Some(m) => Some(m.min(s)),
            })
    }
}

/// The frame-analysis step. A remote model, a client-supplied result, or
/// a deterministic test double all satisfy the same contract, so the
/// policy engine never knows which one ran.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this analyzer can produce results right now. The session
    /// proceeds with degraded analysis when it cannot.
    fn is_available(&self) -> bool;

    async fn analyze(&self, frame: &CapturedFrame) -> Result<DetectionSample>;
}

/// Analyzer for the sidecar deployment: the capturing client runs face
/// detection next to the camera and attaches the result to each frame.
pub struct ClientDetectionAnalyzer;

#[async_trait]
impl FrameAnalyzer for ClientDetectionAnalyzer {
    fn name(&self) -> &'static str {
        "client-detection"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn analyze(&self, frame: &CapturedFrame) -> Result<DetectionSample> {
        frame
            .detection
            .clone()
            .ok_or_else(|| anyhow::anyhow!("frame carried no detection data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_liveness_empty() {
        let sample = DetectionSample {
            timestamp: Utc::now(),
            face_count: 0,
            face_boxes: vec![],
            liveness_scores: vec![],
            face_confidence_min: 0.0,
        };
        assert!(sample.min_liveness().is_none());
    }

    #[test]
    fn test_min_liveness_picks_lowest() {
        let sample = DetectionSample {
            timestamp: Utc::now(),
            face_count: 2,
            face_boxes: vec![],
            liveness_scores: vec![0.9, 0.4, 0.7],
            face_confidence_min: 0.8,
        };
        assert_eq!(sample.min_liveness(), Some(0.4));
    }

    #[tokio::test]
    async fn test_client_analyzer_requires_detection_data() {
        let analyzer = ClientDetectionAnalyzer;
        let frame = CapturedFrame {
            captured_at: Utc::now(),
            jpeg: vec![0xff, 0xd8],
            width: 320,
            height: 240,
            detection: None,
        };
        assert!(analyzer.analyze(&frame).await.is_err());
    }
}
