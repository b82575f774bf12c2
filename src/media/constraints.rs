//! Capture constraint sets and the acquisition fallback ladder.
//!
//! Pure data; no devices are touched here.

use serde::{Deserialize, Serialize};

/// Requested video capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Requested audio capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// One rung of the acquisition ladder: video parameters plus optional audio.
/// `audio: None` means a video-only stream is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: VideoConstraints,
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Preferred constraints: full resolution and echo-cancelled audio.
    pub fn ideal() -> Self {
        Self {
            video: VideoConstraints {
                width: 1280,
                height: 720,
                frame_rate: 30,
            },
            audio: Some(AudioConstraints::default()),
        }
    }

    /// First fallback: reduced resolution, audio kept.
    pub fn reduced() -> Self {
        Self {
            video: VideoConstraints {
                width: 640,
                height: 480,
                frame_rate: 15,
            },
            audio: Some(AudioConstraints::default()),
        }
    }

    /// Last resort: minimal video, no audio at all.
    pub fn minimal() -> Self {
        Self {
            video: VideoConstraints {
                width: 320,
                height: 240,
                frame_rate: 10,
            },
            audio: None,
        }
    }

    /// The full retry ladder, most demanding first. Acquisition walks this
    /// in order and gives up only after the last rung fails.
    pub fn ladder() -> Vec<MediaConstraints> {
        vec![Self::ideal(), Self::reduced(), Self::minimal()]
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_has_three_rungs() {
        assert_eq!(MediaConstraints::ladder().len(), 3);
    }

    #[test]
    fn test_ladder_degrades_monotonically() {
        let ladder = MediaConstraints::ladder();
        for pair in ladder.windows(2) {
            assert!(pair[0].video.width > pair[1].video.width);
            assert!(pair[0].video.frame_rate > pair[1].video.frame_rate);
        }
    }

    #[test]
    fn test_only_last_rung_drops_audio() {
        let ladder = MediaConstraints::ladder();
        assert!(ladder[0].has_audio());
        assert!(ladder[1].has_audio());
        assert!(!ladder[2].has_audio());
    }
}
