//! Session lifecycle orchestrator.
//!
//! Drives one voting session end to end:
//! initializing → acquiring media → secure ⇄ warning → violation →
//! {completed | blocked | cancelled | simulation}
//!
//! Two sampling loops run as cancellable tasks over shared monitor
//! state: the audio loop (~100 ms) and the video loop (~2 s). Remote
//! security checks are fired and forgotten; their verdicts drain through
//! a channel on later video ticks so a slow backend never stalls a loop.
//! Every exit path funnels through the same cleanup: stop the loops,
//! then release the stream.

use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{self, SessionOutcome, SessionRepository, ViolationRepository};
use crate::detect::{
    AudioAnomalyDetector, AudioSample, FrameAnalyzer, VideoAnomalyDetector,
};
use crate::evidence::{EvidenceRecord, EvidenceSink, RecorderConfig, SessionRecorder};
use crate::media::{AcquisitionOutcome, MediaAcquisition, MediaBackend, MediaStreamHandle};
use crate::policy::{PolicyEngine, Severity, ViolationEvent, ViolationType};
use crate::security::{RemoteSecurityCheck, RemoteVerdict};

use super::events::SessionEvents;
use super::status::{SessionPhase, SessionStatusHandle};

/// Everything a session needs injected. Doubles stand in for any of it
/// in tests.
pub struct SessionDeps {
    pub backend: Box<dyn MediaBackend>,
    pub analyzer: Arc<dyn FrameAnalyzer>,
    pub remote: Option<Arc<RemoteSecurityCheck>>,
    pub sink: Option<Arc<dyn EvidenceSink>>,
    pub events: Arc<dyn SessionEvents>,
    pub status: SessionStatusHandle,
    /// Write to the local session journal. Off in tests.
    pub journal: bool,
}

/// Mutable monitor state shared by both loops. The mutex serializes the
/// loops, so detector and policy state never see interleaved updates.
struct MonitorCore {
    stream: MediaStreamHandle,
    audio_detector: AudioAnomalyDetector,
    video_detector: VideoAnomalyDetector,
    policy: PolicyEngine,
    recorder: SessionRecorder,
    /// True once a terminal decision was acted on; later ticks and the
    /// other loop must not re-run the evidence path.
    finalized: bool,
    audio_active: bool,
    video_active: bool,
}

struct Shared {
    cfg: Config,
    voter_id: String,
    election_id: String,
    journal_id: Option<i64>,
    journal: bool,
    core: Mutex<MonitorCore>,
    status: SessionStatusHandle,
    events: Arc<dyn SessionEvents>,
    analyzer: Arc<dyn FrameAnalyzer>,
    remote: Option<Arc<RemoteSecurityCheck>>,
    sink: Option<Arc<dyn EvidenceSink>>,
    cancel: CancellationToken,
    verdict_tx: mpsc::UnboundedSender<RemoteVerdict>,
    verdict_rx: Mutex<mpsc::UnboundedReceiver<RemoteVerdict>>,
}

pub struct SessionController {
    session_uuid: String,
    voter_id: String,
    election_id: String,
    monitor: Option<Arc<Shared>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    status: SessionStatusHandle,
    events: Arc<dyn SessionEvents>,
    journal: bool,
    journal_id: Option<i64>,
}

impl SessionController {
    /// Start monitoring one voting session. Media failure degrades to
    /// simulation mode instead of erroring.
    pub async fn start(
        cfg: Config,
        deps: SessionDeps,
        voter_id: &str,
        election_id: &str,
    ) -> Result<SessionController> {
        let session_uuid = uuid::Uuid::new_v4().to_string();
        let status = deps.status.clone();
        status.begin(voter_id.to_string(), election_id.to_string()).await;

        info!(
            "Starting session {} for voter {} in election {}",
            session_uuid, voter_id, election_id
        );

        if !deps.analyzer.is_available() {
            // Optional capability: proceed with whatever analysis the
            // remote check still provides.
            warn!(
                "Frame analyzer '{}' unavailable, monitoring degraded",
                deps.analyzer.name()
            );
        }

        let journal_id = if deps.journal {
            match db::init_db()
                .and_then(|conn| SessionRepository::insert(&conn, &session_uuid, voter_id, election_id))
            {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Session journal unavailable: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        status.set_phase(SessionPhase::AcquiringMedia).await;
        let acquisition = MediaAcquisition::new(deps.backend);
        let stream = match acquisition.acquire() {
            AcquisitionOutcome::Stream(stream) => stream,
            AcquisitionOutcome::Unavailable { last_error } => {
                // The voter still votes; the session is flagged for
                // downstream review instead.
                warn!(
                    "Entering simulation mode, media unavailable: {}",
                    last_error
                );
                status
                    .set_phase_with_message(
                        SessionPhase::Simulation,
                        "Monitoring unavailable; session flagged for manual review",
                    )
                    .await;
                return Ok(SessionController {
                    session_uuid,
                    voter_id: voter_id.to_string(),
                    election_id: election_id.to_string(),
                    monitor: None,
                    tasks: Mutex::new(Vec::new()),
                    status,
                    events: deps.events,
                    journal: deps.journal,
                    journal_id,
                });
            }
        };

        let evidence_dir = cfg
            .evidence
            .resolved_dir()
            .unwrap_or_else(|_| std::env::temp_dir().join("scrutineer-evidence"));
        let mut recorder_cfg = RecorderConfig::new(evidence_dir);
        recorder_cfg.clip_ms = cfg.evidence.clip_ms;

        let core = MonitorCore {
            stream,
            audio_detector: AudioAnomalyDetector::new(cfg.audio),
            video_detector: VideoAnomalyDetector::new(cfg.video),
            policy: PolicyEngine::new(cfg.policy, voter_id, election_id),
            recorder: SessionRecorder::new(recorder_cfg),
            finalized: false,
            audio_active: false,
            video_active: false,
        };

        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            cfg,
            voter_id: voter_id.to_string(),
            election_id: election_id.to_string(),
            journal_id,
            journal: deps.journal,
            core: Mutex::new(core),
            status: status.clone(),
            events: deps.events.clone(),
            analyzer: deps.analyzer,
            remote: deps.remote,
            sink: deps.sink,
            cancel: CancellationToken::new(),
            verdict_tx,
            verdict_rx: Mutex::new(verdict_rx),
        });

        let audio_task = tokio::spawn(audio_loop(Arc::clone(&shared)));
        let video_task = tokio::spawn(video_loop(Arc::clone(&shared)));

        status.set_phase(SessionPhase::Secure).await;
        info!("Session {} secure, monitoring active", session_uuid);

        Ok(SessionController {
            session_uuid,
            voter_id: voter_id.to_string(),
            election_id: election_id.to_string(),
            monitor: Some(shared),
            tasks: Mutex::new(vec![audio_task, video_task]),
            status,
            events: deps.events,
            journal: deps.journal,
            journal_id,
        })
    }

    pub fn session_uuid(&self) -> &str {
        &self.session_uuid
    }

    /// The voter finished their ballot. Rejected when the session
    /// already ended in a violation or cancellation.
    pub async fn complete(&self, candidate_id: &str) -> Result<()> {
        let phase = self.status.get().await.phase;
        match phase {
            SessionPhase::Blocked | SessionPhase::Violation => {
                bail!("session is blocked; the vote was rejected")
            }
            SessionPhase::Cancelled => bail!("session was cancelled"),
            SessionPhase::Completed => bail!("session already completed"),
            SessionPhase::Simulation => {
                // Vote accepted without monitoring, flagged downstream.
                self.status.set_phase(SessionPhase::Completed).await;
                self.finish_journal(SessionOutcome::Simulation, None);
                self.events.on_voting_complete(candidate_id).await;
                info!(
                    "Session {} completed in simulation mode for candidate {}",
                    self.session_uuid, candidate_id
                );
                Ok(())
            }
            _ => {
                self.shutdown_monitor().await;
                self.status.set_phase(SessionPhase::Completed).await;
                self.finish_journal(SessionOutcome::Completed, None);
                self.events.on_voting_complete(candidate_id).await;
                info!(
                    "Session {} completed for candidate {}",
                    self.session_uuid, candidate_id
                );
                Ok(())
            }
        }
    }

    /// Abort the session. Safe to call in any phase.
    pub async fn cancel(&self) -> Result<()> {
        let phase = self.status.get().await.phase;
        if phase.is_terminal() {
            debug!("Cancel requested on terminal session {}", self.session_uuid);
            return Ok(());
        }

        self.shutdown_monitor().await;
        self.status.set_phase(SessionPhase::Cancelled).await;
        self.finish_journal(SessionOutcome::Cancelled, None);
        self.events.on_cancel().await;
        info!("Session {} cancelled", self.session_uuid);
        Ok(())
    }

    /// Stop the loops, then release the stream — in that order, so no
    /// tick fires on a dead stream.
    async fn shutdown_monitor(&self) {
        let Some(shared) = &self.monitor else { return };
        shared.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Monitor loop panicked: {}", e);
            }
        }

        let mut core = shared.core.lock().await;
        core.stream.release();
    }

    fn finish_journal(&self, outcome: SessionOutcome, audit_ref: Option<&str>) {
        if !self.journal {
            return;
        }
        if let Some(id) = self.journal_id {
            let conn = db::init_db().ok();
            if let Some(conn) = &conn {
                let _ = SessionRepository::finish(conn, id, outcome, audit_ref);
            }
        }
    }
}

async fn audio_loop(shared: Arc<Shared>) {
    let mut interval =
        tokio::time::interval(Duration::from_millis(shared.cfg.monitor.audio_period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut core = shared.core.lock().await;
                if core.finalized || core.stream.is_released() {
                    break;
                }
                audio_tick(&shared, &mut core).await;
            }
        }
    }
    debug!("Audio loop stopped");
}

async fn audio_tick(shared: &Arc<Shared>, core: &mut MonitorCore) {
    // A stream acquired without audio simply has nothing to sample.
    let Some(result) = core.stream.read_audio() else {
        return;
    };

    let chunk = match result {
        Ok(chunk) => chunk,
        Err(e) => {
            // Tick skipped, prior state retained.
            warn!("Audio sampling failed this tick: {:#}", e);
            return;
        }
    };

    let now = Utc::now();
    let sample = AudioSample {
        timestamp: now,
        level: chunk.level,
    };

    core.recorder.push_audio(&chunk);
    let assessment = core.audio_detector.push(&sample);
    shared.status.set_audio_level(assessment.level).await;

    if assessment.high_noise {
        // Informational only; never escalates through the block path.
        debug!("High ambient noise: level {:.0}", assessment.level);
    }

    core.audio_active = assessment.anomaly;
    if let Some(event) = core
        .policy
        .observe(ViolationType::MultipleVoices, assessment.anomaly, now)
    {
        shared.handle_decision(core, event).await;
    } else if !core.audio_active && !core.video_active {
        shared.status.clear_warning_if_idle().await;
    }
}

async fn video_loop(shared: Arc<Shared>) {
    let mut interval =
        tokio::time::interval(Duration::from_millis(shared.cfg.monitor.video_period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut core = shared.core.lock().await;
                if core.finalized || core.stream.is_released() {
                    break;
                }
                video_tick(&shared, &mut core).await;
            }
        }
    }
    debug!("Video loop stopped");
}

async fn video_tick(shared: &Arc<Shared>, core: &mut MonitorCore) {
    // Verdicts from earlier fire-and-forget checks first.
    {
        let mut rx = shared.verdict_rx.lock().await;
        while let Ok(verdict) = rx.try_recv() {
            if core.finalized {
                return;
            }
            let reason = verdict
                .violation_type
                .map(|t| t.as_str().to_string())
                .or(verdict.message.clone());
            if let Some(event) = core.policy.remote_verdict(
                verdict.violation,
                verdict.is_blocked,
                reason,
                Utc::now(),
            ) {
                shared.handle_decision(core, event).await;
            }
        }
    }
    if core.finalized {
        return;
    }

    // No fresh frame since the last tick: skip, do not treat as zero
    // faces.
    let Some(frame) = core.stream.take_frame() else {
        debug!("No fresh frame this tick");
        return;
    };

    core.recorder.push_frame(frame.clone());

    match shared.analyzer.analyze(&frame).await {
        Ok(sample) => {
            let assessment = core.video_detector.push(&sample);
            shared
                .status
                .set_video_flags(
                    assessment.face_detected,
                    assessment.multiple_faces,
                    assessment.fraud_detected,
                )
                .await;

            core.video_active = assessment.multiple_faces;
            let at = sample.timestamp;

            if let Some(event) =
                core.policy
                    .observe(ViolationType::MultipleFaces, assessment.multiple_faces, at)
            {
                shared.handle_decision(core, event).await;
            }
            if !core.finalized {
                if let Some(event) = core.policy.observe_liveness(sample.min_liveness(), at) {
                    shared.handle_decision(core, event).await;
                }
            }
            if !core.finalized && !core.audio_active && !core.video_active {
                shared.status.clear_warning_if_idle().await;
            }
        }
        Err(e) => {
            // Analysis failure skips the tick; the loop continues.
            warn!("Frame analysis failed this tick: {:#}", e);
        }
    }

    if core.finalized {
        return;
    }

    // Forward the frame for a backend verdict without holding up the
    // loop; the result lands on a later tick.
    if let Some(remote) = &shared.remote {
        let remote = Arc::clone(remote);
        let tx = shared.verdict_tx.clone();
        let voter_id = shared.voter_id.clone();
        let election_id = shared.election_id.clone();
        tokio::spawn(async move {
            if let Some(verdict) = remote.check(&frame, &voter_id, &election_id).await {
                let _ = tx.send(verdict);
            }
        });
    }
}

impl Shared {
    async fn handle_decision(&self, core: &mut MonitorCore, event: ViolationEvent) {
        match event.severity {
            Severity::Warn => {
                self.status.set_warning(event.message.clone(), event.warnings_count).await;
                self.journal_violation(core, &event);
            }
            Severity::Block | Severity::ManualReview => {
                if core.finalized {
                    return;
                }
                core.finalized = true;
                self.finalize_violation(core, event).await;
            }
        }
    }

    /// The irreversible part: surface the violation, capture evidence,
    /// file it, end the session.
    async fn finalize_violation(&self, core: &mut MonitorCore, event: ViolationEvent) {
        warn!(
            "Terminal policy decision for session voter {}: {}",
            self.voter_id, event.message
        );

        self.status
            .set_phase_with_message(SessionPhase::Violation, event.message.clone())
            .await;
        if let Some(audit_ref) = &event.audit_ref {
            self.status.set_audit_ref(audit_ref.clone()).await;
        }
        self.events.on_security_violation(&event.message, &event).await;

        let audit_ref = event.audit_ref.clone().unwrap_or_default();
        let reason = event
            .reason
            .clone()
            .unwrap_or_else(|| event.violation_type.as_str().to_string());

        let record = match core
            .recorder
            .extract_clip(&audit_ref, &self.voter_id, &self.election_id, &reason)
        {
            Ok(record) => record,
            Err(e) => {
                // Recording failure does not reverse the decision; file
                // metadata without media.
                warn!("Evidence clip extraction failed: {:#}", e);
                EvidenceRecord {
                    audit_ref: audit_ref.clone(),
                    voter_id: self.voter_id.clone(),
                    election_id: self.election_id.clone(),
                    reason: reason.clone(),
                    bundle_path: None,
                    sha256: None,
                    meta: serde_json::json!({
                        "auditRef": audit_ref,
                        "reason": reason,
                        "error": "evidence capture failed",
                    }),
                }
            }
        };

        // At most one upload attempt; failure is logged, never retried,
        // and the local decision stands either way.
        if let Some(sink) = &self.sink {
            let sink = Arc::clone(sink);
            tokio::spawn(async move {
                if let Err(e) = sink.upload(&record).await {
                    error!("Evidence upload failed (block stands): {:#}", e);
                }
            });
        }

        self.journal_violation(core, &event);
        let outcome = match event.severity {
            Severity::ManualReview => SessionOutcome::ManualReview,
            _ => SessionOutcome::Blocked,
        };
        if self.journal {
            if let Some(id) = self.journal_id {
                let conn = db::init_db().ok();
                if let Some(conn) = &conn {
                    let _ = SessionRepository::finish(conn, id, outcome, event.audit_ref.as_deref());
                }
            }
        }

        self.status
            .set_phase_with_message(SessionPhase::Blocked, event.message.clone())
            .await;

        // Loops first, stream second.
        self.cancel.cancel();
        core.stream.release();
    }

    fn journal_violation(&self, _core: &MonitorCore, event: &ViolationEvent) {
        if !self.journal {
            return;
        }
        if let Some(id) = self.journal_id {
            let conn = db::init_db().ok();
            if let Some(conn) = &conn {
                let _ = ViolationRepository::insert(conn, id, event);
            }
        }
    }
}
