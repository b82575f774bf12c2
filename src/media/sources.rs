//! Capture source abstractions shared by acquisition and the samplers.
//!
//! The controller never talks to a device directly: audio comes through
//! `AudioLevelSource`, frames through `FrameSource`, and device opening
//! through `MediaBackend`. A deterministic test double can stand in for
//! any of the three.

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::acquisition::MediaStreamHandle;
use super::constraints::MediaConstraints;

/// Why a capture stream could not be opened. Every variant is retryable
/// with degraded constraints; classification only drives logging and the
/// ladder walk.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("camera or microphone permission denied")]
    PermissionDenied,
    #[error("no capture device available")]
    DeviceNotFound,
    #[error("capture device is already in use")]
    DeviceBusy,
    #[error("constraints cannot be satisfied: {0}")]
    Overconstrained(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// One drained batch of microphone audio: the instantaneous level
/// (0..100) plus the raw samples behind it, kept for evidence recording.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub level: f32,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A still frame captured from the video track, JPEG-encoded. When the
/// capturing client ran its own face analysis it attaches the result so
/// the local analyzer seam can consume it without re-detecting.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub captured_at: DateTime<Utc>,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub detection: Option<crate::detect::DetectionSample>,
}

/// Microphone capture source. `read` drains everything captured since
/// the previous call, so calling it on a fixed period yields fixed-size
/// observation windows.
pub trait AudioLevelSource: Send {
    fn start(&mut self) -> Result<()>;

    fn read(&mut self) -> Result<AudioChunk>;

    /// Stop capturing. Must be safe to call more than once.
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

/// Video frame source. `take_frame` hands out each captured frame at
/// most once; `None` means nothing new arrived since the last call.
pub trait FrameSource: Send {
    fn take_frame(&self) -> Option<CapturedFrame>;
}

/// Opens capture streams for a given constraint set. Implemented by
/// `DeviceBackend` for real devices and by doubles in tests.
pub trait MediaBackend: Send + Sync {
    fn open(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError>;
}
