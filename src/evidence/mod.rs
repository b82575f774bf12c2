//! Audit evidence: rolling capture, packaging, and upload.

pub mod recorder;
pub mod uploader;

use serde_json::Value;
use std::path::PathBuf;

pub use recorder::{RecorderConfig, SessionRecorder};
pub use uploader::{AuditUploader, EvidenceSink};

/// Everything the audit store needs about one block event. Created only
/// when a terminal decision fires, uploaded at most once.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    pub audit_ref: String,
    pub voter_id: String,
    pub election_id: String,
    pub reason: String,
    /// Local path of the packaged evidence bundle, when packaging
    /// succeeded.
    pub bundle_path: Option<PathBuf>,
    /// SHA-256 of the bundle — the tamper-evidence seal echoed in the
    /// metadata.
    pub sha256: Option<String>,
    pub meta: Value,
}
