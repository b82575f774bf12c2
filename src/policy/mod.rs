//! The escalation policy state machine.
//!
//! Candidate conditions from the detectors become counted occurrences
//! only after they persist for a full persistence window (debounce), and
//! occurrences escalate warn → warn → block per violation type. The
//! blocked state is terminal and monotonic: once reached, every further
//! observation returns the same block decision and mutates nothing.
//!
//! The engine reads no clock of its own — callers stamp every
//! observation — so a test can replay any timeline deterministically.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// The conditions the policy escalates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    MultipleVoices,
    MultipleFaces,
    LivenessFailure,
    RemoteViolation,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleVoices => "multiple_voices",
            Self::MultipleFaces => "multiple_faces",
            Self::LivenessFailure => "liveness_failure",
            Self::RemoteViolation => "remote_violation",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::MultipleVoices => "multiple voices detected",
            Self::MultipleFaces => "multiple faces detected",
            Self::LivenessFailure => "liveness check failed",
            Self::RemoteViolation => "security service reported a violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warn,
    Block,
    ManualReview,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Block => "block",
            Self::ManualReview => "manual_review",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Block | Self::ManualReview)
    }
}

/// One decision emitted by the engine. Consumed by the controller and,
/// for terminal severities, by the evidence path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub message: String,
    pub warnings_count: u32,
    pub reason: Option<String>,
    pub audit_ref: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Persistence window for multiple-faces/voices candidates.
    pub multiple_persistence_ms: i64,
    /// Occurrences of a multiple-* condition before the block.
    pub max_multiple_occurrences: u32,
    /// Liveness scores below this are failing.
    pub liveness_threshold: f32,
    /// Persistence window for a failing liveness score.
    pub liveness_persistence_ms: i64,
    /// Counted liveness failures before manual review.
    pub max_liveness_fails: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            multiple_persistence_ms: 2000,
            max_multiple_occurrences: 3,
            liveness_threshold: 0.6,
            liveness_persistence_ms: 1500,
            max_liveness_fails: 3,
        }
    }
}

/// Per-session escalation state. Mutated only by the engine; destroyed
/// with the session. `blocked` moves false→true exactly once.
#[derive(Debug)]
pub struct PolicySession {
    pub voter_id: String,
    pub election_id: String,
    warning_counters: HashMap<ViolationType, u32>,
    debounce_since: HashMap<ViolationType, DateTime<Utc>>,
    terminal: Option<ViolationEvent>,
}

impl PolicySession {
    fn new(voter_id: String, election_id: String) -> Self {
        Self {
            voter_id,
            election_id,
            warning_counters: HashMap::new(),
            debounce_since: HashMap::new(),
            terminal: None,
        }
    }

    pub fn blocked(&self) -> bool {
        self.terminal
            .as_ref()
            .is_some_and(|e| e.severity == Severity::Block)
    }

    pub fn warnings_for(&self, vt: ViolationType) -> u32 {
        self.warning_counters.get(&vt).copied().unwrap_or(0)
    }
}

pub struct PolicyEngine {
    cfg: PolicyConfig,
    session: PolicySession,
}

impl PolicyEngine {
    pub fn new(cfg: PolicyConfig, voter_id: impl Into<String>, election_id: impl Into<String>) -> Self {
        Self {
            cfg,
            session: PolicySession::new(voter_id.into(), election_id.into()),
        }
    }

    pub fn session(&self) -> &PolicySession {
        &self.session
    }

    /// Whether any terminal decision (block or manual review) was made.
    pub fn terminal(&self) -> Option<&ViolationEvent> {
        self.session.terminal.as_ref()
    }

    /// Feed one debounced candidate observation: `active` says whether
    /// the condition holds right now. Returns a decision when a warning
    /// or terminal action fires, `None` otherwise. After a terminal
    /// decision every call returns that same decision.
    pub fn observe(
        &mut self,
        vt: ViolationType,
        active: bool,
        at: DateTime<Utc>,
    ) -> Option<ViolationEvent> {
        if let Some(terminal) = &self.session.terminal {
            return Some(terminal.clone());
        }

        if !active {
            // Condition cleared before the window elapsed: nothing counts.
            self.session.debounce_since.remove(&vt);
            return None;
        }

        let persistence = Duration::milliseconds(self.persistence_ms(vt));
        match self.session.debounce_since.get(&vt).copied() {
            None => {
                self.session.debounce_since.insert(vt, at);
                None
            }
            Some(since) if at - since < persistence => None,
            Some(_) => {
                // One full persistence window elapsed: count it and
                // restart the timer so a sustained condition keeps
                // escalating window by window.
                self.session.debounce_since.insert(vt, at);
                Some(self.record_occurrence(vt, at))
            }
        }
    }

    /// Liveness observations carry a score instead of a flag.
    pub fn observe_liveness(
        &mut self,
        min_score: Option<f32>,
        at: DateTime<Utc>,
    ) -> Option<ViolationEvent> {
        let failing = min_score.is_some_and(|s| s < self.cfg.liveness_threshold);
        self.observe(ViolationType::LivenessFailure, failing, at)
    }

    /// Fold a remote security verdict into the same escalation channel.
    /// The backend applied its own persistence before speaking up, so a
    /// plain violation counts immediately; `is_blocked` ends the session
    /// on the spot.
    pub fn remote_verdict(
        &mut self,
        violation: bool,
        is_blocked: bool,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Option<ViolationEvent> {
        if let Some(terminal) = &self.session.terminal {
            return Some(terminal.clone());
        }
        if !violation {
            return None;
        }
        if is_blocked {
            let event = self.terminal_event(ViolationType::RemoteViolation, Severity::Block, reason, at);
            return Some(event);
        }
        let mut event = self.record_occurrence(ViolationType::RemoteViolation, at);
        if event.reason.is_none() {
            event.reason = reason;
        }
        Some(event)
    }

    fn persistence_ms(&self, vt: ViolationType) -> i64 {
        match vt {
            ViolationType::LivenessFailure => self.cfg.liveness_persistence_ms,
            // Remote verdicts never reach the debounce path.
            _ => self.cfg.multiple_persistence_ms,
        }
    }

    fn max_occurrences(&self, vt: ViolationType) -> u32 {
        match vt {
            ViolationType::LivenessFailure => self.cfg.max_liveness_fails,
            _ => self.cfg.max_multiple_occurrences,
        }
    }

    fn terminal_severity(&self, vt: ViolationType) -> Severity {
        match vt {
            ViolationType::LivenessFailure => Severity::ManualReview,
            _ => Severity::Block,
        }
    }

    fn record_occurrence(&mut self, vt: ViolationType, at: DateTime<Utc>) -> ViolationEvent {
        let count = self.session.warning_counters.entry(vt).or_insert(0);
        *count += 1;
        let count = *count;

        if count >= self.max_occurrences(vt) {
            let severity = self.terminal_severity(vt);
            return self.terminal_event(vt, severity, None, at);
        }

        let prefix = match count {
            1 => "1st warning",
            2 => "2nd and final warning",
            _ => "warning",
        };
        let message = format!("{}: {}", prefix, vt.describe());
        warn!("Policy warning ({}): {}", vt.as_str(), message);

        ViolationEvent {
            violation_type: vt,
            severity: Severity::Warn,
            message,
            warnings_count: count,
            reason: None,
            audit_ref: None,
            at,
        }
    }

    fn terminal_event(
        &mut self,
        vt: ViolationType,
        severity: Severity,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> ViolationEvent {
        let audit_ref = format!(
            "audit_{}_{}_{}",
            self.session.voter_id,
            self.session.election_id,
            at.timestamp_millis()
        );
        let message = match severity {
            Severity::Block => format!("Session blocked: repeated {}", vt.describe()),
            Severity::ManualReview => {
                format!("Session flagged for manual review: {}", vt.describe())
            }
            Severity::Warn => unreachable!("terminal events are never warnings"),
        };

        info!(
            "Policy terminal decision for voter {} in election {}: {} ({})",
            self.session.voter_id,
            self.session.election_id,
            severity.as_str(),
            audit_ref
        );

        let event = ViolationEvent {
            violation_type: vt,
            severity,
            message,
            warnings_count: self.session.warnings_for(vt),
            reason,
            audit_ref: Some(audit_ref),
            at,
        };
        self.session.terminal = Some(event.clone());
        event
    }
}
