//! Session status types and the shared state handle the UI polls.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Phase of the monitored voting-session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initializing,
    AcquiringMedia,
    Secure,
    Warning,
    Violation,
    Completed,
    Blocked,
    Cancelled,
    Simulation,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AcquiringMedia => "acquiring_media",
            Self::Secure => "secure",
            Self::Warning => "warning",
            Self::Violation => "violation",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
            Self::Simulation => "simulation",
        }
    }

    /// Terminal phases end the session. `Simulation` is not terminal:
    /// the vote is still in progress, just unmonitored.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Blocked | Self::Cancelled)
    }
}

/// The observable surface consumed by the voting UI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub message: Option<String>,
    pub audio_level: f32,
    pub face_detected: bool,
    pub multiple_faces: bool,
    pub fraud_detected: bool,
    pub voting_progress: u8,
    pub warnings: u32,
    pub audit_ref: Option<String>,
    pub voter_id: Option<String>,
    pub election_id: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Initializing,
            message: None,
            audio_level: 0.0,
            face_detected: false,
            multiple_faces: false,
            fraud_detected: false,
            voting_progress: 0,
            warnings: 0,
            audit_ref: None,
            voter_id: None,
            election_id: None,
        }
    }
}

/// Thread-safe handle shared by the controller, the loops, and the API.
#[derive(Clone, Default)]
pub struct SessionStatusHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionStatusHandle {
    pub async fn get(&self) -> SessionState {
        self.inner.lock().await.clone()
    }

    pub async fn begin(&self, voter_id: String, election_id: String) {
        let mut state = self.inner.lock().await;
        *state = SessionState {
            voter_id: Some(voter_id),
            election_id: Some(election_id),
            ..SessionState::default()
        };
    }

    pub async fn set_phase(&self, phase: SessionPhase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
        if phase == SessionPhase::Secure {
            state.message = None;
        }
    }

    pub async fn set_phase_with_message(&self, phase: SessionPhase, message: impl Into<String>) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
        state.message = Some(message.into());
    }

    pub async fn set_warning(&self, message: impl Into<String>, warnings: u32) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Warning;
        state.message = Some(message.into());
        state.warnings = warnings;
    }

    pub async fn set_audio_level(&self, level: f32) {
        let mut state = self.inner.lock().await;
        state.audio_level = level;
    }

    pub async fn set_video_flags(&self, face_detected: bool, multiple_faces: bool, fraud: bool) {
        let mut state = self.inner.lock().await;
        state.face_detected = face_detected;
        state.multiple_faces = multiple_faces;
        state.fraud_detected = fraud;
    }

    pub async fn set_progress(&self, progress: u8) {
        let mut state = self.inner.lock().await;
        state.voting_progress = progress.min(100);
    }

    pub async fn set_audit_ref(&self, audit_ref: String) {
        let mut state = self.inner.lock().await;
        state.audit_ref = Some(audit_ref);
    }

    /// Drop back from `Warning` to `Secure` once nothing is active.
    pub async fn clear_warning_if_idle(&self) {
        let mut state = self.inner.lock().await;
        if state.phase == SessionPhase::Warning {
            state.phase = SessionPhase::Secure;
            state.message = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_as_str() {
        assert_eq!(SessionPhase::Initializing.as_str(), "initializing");
        assert_eq!(SessionPhase::AcquiringMedia.as_str(), "acquiring_media");
        assert_eq!(SessionPhase::Secure.as_str(), "secure");
        assert_eq!(SessionPhase::Simulation.as_str(), "simulation");
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Blocked.is_terminal());
        assert!(SessionPhase::Cancelled.is_terminal());
        assert!(!SessionPhase::Simulation.is_terminal());
        assert!(!SessionPhase::Warning.is_terminal());
        assert!(!SessionPhase::Secure.is_terminal());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&SessionPhase::AcquiringMedia).unwrap();
        assert_eq!(json, "\"acquiring_media\"");
    }

    #[tokio::test]
    async fn test_begin_resets_state() {
        let handle = SessionStatusHandle::default();
        handle.set_progress(80).await;
        handle.begin("voter1".into(), "election1".into()).await;

        let state = handle.get().await;
        assert_eq!(state.phase, SessionPhase::Initializing);
        assert_eq!(state.voting_progress, 0);
        assert_eq!(state.voter_id.as_deref(), Some("voter1"));
    }

    #[tokio::test]
    async fn test_warning_then_idle_clears() {
        let handle = SessionStatusHandle::default();
        handle.set_warning("1st warning: multiple faces detected", 1).await;
        assert_eq!(handle.get().await.phase, SessionPhase::Warning);

        handle.clear_warning_if_idle().await;
        let state = handle.get().await;
        assert_eq!(state.phase, SessionPhase::Secure);
        assert!(state.message.is_none());
        // The counter itself survives; only the banner clears.
        assert_eq!(state.warnings, 1);
    }

    #[tokio::test]
    async fn test_clear_warning_leaves_other_phases_alone() {
        let handle = SessionStatusHandle::default();
        handle.set_phase_with_message(SessionPhase::Violation, "blocked").await;
        handle.clear_warning_if_idle().await;
        assert_eq!(handle.get().await.phase, SessionPhase::Violation);
    }

    #[tokio::test]
    async fn test_progress_clamped() {
        let handle = SessionStatusHandle::default();
        handle.set_progress(250).await;
        assert_eq!(handle.get().await.voting_progress, 100);
    }
}
