//! The production capture backend: cpal microphone plus the HTTP frame pipe.

use tracing::debug;

use super::acquisition::MediaStreamHandle;
use super::constraints::MediaConstraints;
use super::frames::FramePipe;
use super::mic::MicLevelSource;
use super::sources::{AudioLevelSource, MediaBackend, MediaError};

const MIC_SAMPLE_RATE: u32 = 16_000;

/// Opens the real devices. Video frames arrive through the shared
/// `FramePipe` fed by the ingest route, so only the microphone is opened
/// here.
pub struct DeviceBackend {
    frames: FramePipe,
}

impl DeviceBackend {
    pub fn new(frames: FramePipe) -> Self {
        Self { frames }
    }
}

impl MediaBackend for DeviceBackend {
    fn open(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError> {
        let audio: Option<Box<dyn AudioLevelSource>> = match constraints.audio {
            Some(requested) => {
                // cpal exposes no echo-cancellation knob; the request is
                // satisfied by whatever processing the OS input path does.
                debug!(
                    "Opening microphone (echo_cancellation requested: {})",
                    requested.echo_cancellation
                );
                let mut mic = MicLevelSource::new(MIC_SAMPLE_RATE);
                mic.start().map_err(classify_mic_error)?;
                Some(Box::new(mic))
            }
            None => None,
        };

        Ok(MediaStreamHandle::new(
            audio,
            Box::new(self.frames.clone()),
            *constraints,
        ))
    }
}

/// Fold cpal failures into the acquisition error taxonomy so the ladder
/// can log something more useful than a backend string.
fn classify_mic_error(e: anyhow::Error) -> MediaError {
    if let Some(build) = e.downcast_ref::<cpal::BuildStreamError>() {
        return match build {
            cpal::BuildStreamError::DeviceNotAvailable => MediaError::DeviceBusy,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                MediaError::Overconstrained(build.to_string())
            }
            _ => MediaError::Backend(e),
        };
    }
    if let Some(play) = e.downcast_ref::<cpal::PlayStreamError>() {
        return match play {
            cpal::PlayStreamError::DeviceNotAvailable => MediaError::DeviceBusy,
            _ => MediaError::Backend(e),
        };
    }
    if e.to_string().contains("No input device") {
        return MediaError::DeviceNotFound;
    }
    MediaError::Backend(e)
}
