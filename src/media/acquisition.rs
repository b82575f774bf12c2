//! Media acquisition: the retry ladder over a capture backend, and the
//! stream handle every sampler shares.
//!
//! Acquisition never hard-fails the voter: after the last ladder rung the
//! outcome is `Unavailable` and the controller degrades to simulation mode.

use tracing::{info, warn};

use super::constraints::MediaConstraints;
use super::sources::{AudioChunk, AudioLevelSource, CapturedFrame, FrameSource, MediaBackend, MediaError};

/// Exclusive owner of the live capture sources for one session. Only
/// acquisition creates one, only the active session holds it, and
/// `release` is safe on every exit path, repeated or not.
pub struct MediaStreamHandle {
    audio: Option<Box<dyn AudioLevelSource>>,
    video: Option<Box<dyn FrameSource>>,
    constraints: MediaConstraints,
    released: bool,
}

impl MediaStreamHandle {
    pub fn new(
        audio: Option<Box<dyn AudioLevelSource>>,
        video: Box<dyn FrameSource>,
        constraints: MediaConstraints,
    ) -> Self {
        Self {
            audio,
            video: Some(video),
            constraints,
            released: false,
        }
    }

    pub fn constraints(&self) -> &MediaConstraints {
        &self.constraints
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Drain the audio captured since the last call. `None` when the
    /// stream was acquired without audio or already released.
    pub fn read_audio(&mut self) -> Option<anyhow::Result<AudioChunk>> {
        if self.released {
            return None;
        }
        self.audio.as_mut().map(|source| source.read())
    }

    /// The newest unconsumed frame, if any.
    pub fn take_frame(&self) -> Option<CapturedFrame> {
        if self.released {
            return None;
        }
        self.video.as_ref().and_then(|source| source.take_frame())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop every track and detach the sources. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
        self.video = None;
        self.released = true;
        info!("Media stream released");
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Result of walking the acquisition ladder.
pub enum AcquisitionOutcome {
    Stream(MediaStreamHandle),
    /// Every rung failed. The session may still proceed in simulation
    /// mode; the last error explains why monitoring is unavailable.
    Unavailable { last_error: MediaError },
}

pub struct MediaAcquisition {
    backend: Box<dyn MediaBackend>,
}

impl MediaAcquisition {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Try the preferred constraints, then progressively degraded ones.
    /// Three attempts total; any failure kind moves to the next rung.
    pub fn acquire(&self) -> AcquisitionOutcome {
        let ladder = MediaConstraints::ladder();
        let rungs = ladder.len();
        let mut last_error = MediaError::DeviceNotFound;

        for (attempt, constraints) in ladder.into_iter().enumerate() {
            match self.backend.open(&constraints) {
                Ok(handle) => {
                    info!(
                        "Media acquired on attempt {} ({}x{}@{}fps, audio: {})",
                        attempt + 1,
                        constraints.video.width,
                        constraints.video.height,
                        constraints.video.frame_rate,
                        constraints.has_audio(),
                    );
                    return AcquisitionOutcome::Stream(handle);
                }
                Err(e) => {
                    warn!(
                        "Media acquisition attempt {}/{} failed: {}",
                        attempt + 1,
                        rungs,
                        e
                    );
                    last_error = e;
                }
            }
        }

        warn!("Media acquisition exhausted all constraint rungs: {}", last_error);
        AcquisitionOutcome::Unavailable { last_error }
    }
}
