//! End-to-end session tests over the controller with scripted media.
//!
//! The backend, analyzer, events, and evidence sink are all doubles, so
//! each test drives a full session (sampling loops included) in a few
//! hundred milliseconds without touching real devices or the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use scrutineer::config::Config;
use scrutineer::detect::{ClientDetectionAnalyzer, DetectionSample};
use scrutineer::evidence::{EvidenceRecord, EvidenceSink};
use scrutineer::media::{
    AudioChunk, AudioLevelSource, CapturedFrame, FrameSource, MediaBackend, MediaConstraints,
    MediaError, MediaStreamHandle,
};
use scrutineer::policy::ViolationEvent;
use scrutineer::session::{
    SessionController, SessionDeps, SessionEvents, SessionPhase, SessionStatusHandle,
};

/// A microphone that always reports the same steady level.
struct SteadyAudio {
    level: f32,
}

impl AudioLevelSource for SteadyAudio {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Result<AudioChunk> {
        Ok(AudioChunk {
            level: self.level,
            samples: vec![0.05; 160],
            sample_rate: 16_000,
        })
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }
}

/// A camera that has a fresh frame with the same detection result on
/// every tick.
struct ScriptedFrames {
    face_count: u32,
    confidence: f32,
    liveness: f32,
}

impl FrameSource for ScriptedFrames {
    fn take_frame(&self) -> Option<CapturedFrame> {
        let now = Utc::now();
        Some(CapturedFrame {
            captured_at: now,
            jpeg: vec![0xff, 0xd8, 0xff, 0xe0],
            width: 640,
            height: 480,
            detection: Some(DetectionSample {
                timestamp: now,
                face_count: self.face_count,
                face_boxes: Vec::new(),
                liveness_scores: vec![self.liveness; self.face_count as usize],
                face_confidence_min: self.confidence,
            }),
        })
    }
}

struct ScriptedBackend {
    face_count: u32,
    confidence: f32,
}

impl MediaBackend for ScriptedBackend {
    fn open(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError> {
        let audio: Option<Box<dyn AudioLevelSource>> = constraints
            .has_audio()
            .then(|| Box::new(SteadyAudio { level: 20.0 }) as Box<dyn AudioLevelSource>);
        Ok(MediaStreamHandle::new(
            audio,
            Box::new(ScriptedFrames {
                face_count: self.face_count,
                confidence: self.confidence,
                liveness: 0.95,
            }),
            *constraints,
        ))
    }
}

/// A backend where every constraint rung is denied.
struct DeniedBackend;

impl MediaBackend for DeniedBackend {
    fn open(&self, _constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError> {
        Err(MediaError::PermissionDenied)
    }
}

#[derive(Default)]
struct RecordedEvents {
    completed: StdMutex<Option<String>>,
    violations: StdMutex<Vec<String>>,
    cancelled: AtomicBool,
}

#[async_trait]
impl SessionEvents for RecordedEvents {
    async fn on_security_violation(&self, message: &str, _details: &ViolationEvent) {
        self.violations
            .lock()
            .unwrap()
            .push(message.to_string());
    }

    async fn on_voting_complete(&self, candidate_id: &str) {
        *self.completed.lock().unwrap() = Some(candidate_id.to_string());
    }

    async fn on_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CollectingSink {
    uploads: AtomicUsize,
    last: StdMutex<Option<EvidenceRecord>>,
}

#[async_trait]
impl EvidenceSink for CollectingSink {
    async fn upload(&self, record: &EvidenceRecord) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(record.clone());
        Ok(())
    }
}

/// Fast sampling and short persistence windows so escalation completes
/// within a test run.
fn test_config(evidence_dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.monitor.audio_period_ms = 10;
    cfg.monitor.video_period_ms = 20;
    cfg.policy.multiple_persistence_ms = 30;
    cfg.policy.max_multiple_occurrences = 3;
    cfg.evidence.dir = Some(evidence_dir.to_path_buf());
    cfg
}

fn deps(
    backend: Box<dyn MediaBackend>,
    events: Arc<RecordedEvents>,
    sink: Arc<CollectingSink>,
) -> (SessionDeps, SessionStatusHandle) {
    let status = SessionStatusHandle::default();
    let deps = SessionDeps {
        backend,
        analyzer: Arc::new(ClientDetectionAnalyzer),
        remote: None,
        sink: Some(sink),
        events,
        status: status.clone(),
        journal: false,
    };
    (deps, status)
}

#[tokio::test]
async fn clean_session_completes_without_violations() {
    let evidence = tempfile::tempdir().unwrap();
    let events = Arc::new(RecordedEvents::default());
    let sink = Arc::new(CollectingSink::default());
    let backend = Box::new(ScriptedBackend {
        face_count: 1,
        confidence: 0.9,
    });
    let (deps, status) = deps(backend, events.clone(), sink.clone());

    let controller = SessionController::start(test_config(evidence.path()), deps, "v-1", "e-1")
        .await
        .unwrap();

    // Let both loops sample for a while.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = status.get().await;
    assert_eq!(state.phase, SessionPhase::Secure);
    assert!(state.face_detected);
    assert!(!state.multiple_faces);
    assert!(state.audio_level > 0.0);

    controller.complete("candidate-7").await.unwrap();

    let state = status.get().await;
    assert_eq!(state.phase, SessionPhase::Completed);
    assert_eq!(
        events.completed.lock().unwrap().as_deref(),
        Some("candidate-7")
    );
    assert!(events.violations.lock().unwrap().is_empty());
    assert_eq!(sink.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn persistent_multiple_faces_blocks_and_uploads_once() {
    let evidence = tempfile::tempdir().unwrap();
    let events = Arc::new(RecordedEvents::default());
    let sink = Arc::new(CollectingSink::default());
    let backend = Box::new(ScriptedBackend {
        face_count: 2,
        confidence: 0.9,
    });
    let (deps, status) = deps(backend, events.clone(), sink.clone());

    let controller = SessionController::start(test_config(evidence.path()), deps, "v-2", "e-1")
        .await
        .unwrap();

    // Two warnings and the block need three 30ms persistence windows,
    // plus slack for the spawned upload.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let state = status.get().await;
    assert_eq!(state.phase, SessionPhase::Blocked);
    let audit_ref = state.audit_ref.clone().expect("block carries an audit ref");
    assert!(audit_ref.starts_with("audit_v-2_e-1_"));

    assert_eq!(sink.uploads.load(Ordering::SeqCst), 1);
    let record = sink.last.lock().unwrap().clone().expect("record uploaded");
    assert_eq!(record.audit_ref, audit_ref);
    assert_eq!(record.voter_id, "v-2");
    assert!(record.bundle_path.is_some());
    assert!(record.sha256.is_some());

    let violations = events.violations.lock().unwrap().clone();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("blocked"));

    // A blocked session rejects the ballot.
    assert!(controller.complete("candidate-7").await.is_err());
    assert!(events.completed.lock().unwrap().is_none());
}

#[tokio::test]
async fn denied_media_degrades_to_simulation() {
    let evidence = tempfile::tempdir().unwrap();
    let events = Arc::new(RecordedEvents::default());
    let sink = Arc::new(CollectingSink::default());
    let (deps, status) = deps(Box::new(DeniedBackend), events.clone(), sink.clone());

    let controller = SessionController::start(test_config(evidence.path()), deps, "v-3", "e-1")
        .await
        .unwrap();

    let state = status.get().await;
    assert_eq!(state.phase, SessionPhase::Simulation);

    // The voter still gets to vote; the session is only flagged.
    controller.complete("candidate-2").await.unwrap();
    assert_eq!(status.get().await.phase, SessionPhase::Completed);
    assert_eq!(
        events.completed.lock().unwrap().as_deref(),
        Some("candidate-2")
    );
    assert!(events.violations.lock().unwrap().is_empty());
    assert_eq!(sink.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_stops_monitoring() {
    let evidence = tempfile::tempdir().unwrap();
    let events = Arc::new(RecordedEvents::default());
    let sink = Arc::new(CollectingSink::default());
    let backend = Box::new(ScriptedBackend {
        face_count: 1,
        confidence: 0.9,
    });
    let (deps, status) = deps(backend, events.clone(), sink.clone());

    let controller = SessionController::start(test_config(evidence.path()), deps, "v-4", "e-1")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.cancel().await.unwrap();

    let state = status.get().await;
    assert_eq!(state.phase, SessionPhase::Cancelled);
    assert!(events.cancelled.load(Ordering::SeqCst));

    // Cancelling again is a no-op, completing is rejected.
    controller.cancel().await.unwrap();
    assert!(controller.complete("candidate-1").await.is_err());
}
