//! Latest-frame mailbox between the HTTP ingest route and the frame sampler.
//!
//! The capturing client pushes webcam frames as fast as it likes; the
//! frame sampler drains at its own period. Only the newest frame is kept,
//! and each frame is analyzed at most once.

use std::sync::{Arc, Mutex};

use super::sources::{CapturedFrame, FrameSource};

#[derive(Clone, Default)]
pub struct FramePipe {
    latest: Arc<Mutex<Option<CapturedFrame>>>,
}

impl FramePipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is pending with the newer frame.
    pub fn push(&self, frame: CapturedFrame) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(frame);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }
}

impl FrameSource for FramePipe {
    fn take_frame(&self) -> Option<CapturedFrame> {
        self.latest.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn frame(tag: u8) -> CapturedFrame {
        CapturedFrame {
            captured_at: Utc::now(),
            jpeg: vec![tag],
            width: 320,
            height: 240,
            detection: None,
        }
    }

    #[test]
    fn test_take_consumes_frame() {
        let pipe = FramePipe::new();
        pipe.push(frame(1));
        assert!(pipe.take_frame().is_some());
        assert!(pipe.take_frame().is_none());
    }

    #[test]
    fn test_push_keeps_only_newest() {
        let pipe = FramePipe::new();
        pipe.push(frame(1));
        pipe.push(frame(2));
        let got = pipe.take_frame().unwrap();
        assert_eq!(got.jpeg, vec![2]);
    }

    #[test]
    fn test_clear_discards_pending() {
        let pipe = FramePipe::new();
        pipe.push(frame(1));
        pipe.clear();
        assert!(pipe.take_frame().is_none());
    }
}
