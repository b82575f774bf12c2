//! Client for the backend security-check service.
//!
//! One captured frame per call; any failure — network, non-2xx, bad
//! JSON — simply withholds a verdict for that tick and never reaches
//! the polling loops as an error.

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::media::CapturedFrame;

/// Violation categories the backend can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RemoteViolationType {
    #[serde(rename = "MULTIPLE_FACES")]
    MultipleFaces,
    #[serde(rename = "FACE_MISMATCH")]
    FaceMismatch,
}

impl RemoteViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleFaces => "MULTIPLE_FACES",
            Self::FaceMismatch => "FACE_MISMATCH",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVerdict {
    pub success: bool,
    #[serde(default)]
    pub violation: bool,
    #[serde(default)]
    pub violation_type: Option<RemoteViolationType>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_blocked: bool,
}

pub struct RemoteSecurityCheck {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteSecurityCheck {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build security-check HTTP client")?;

        info!("Remote security check enabled: {}", endpoint);
        Ok(Self { client, endpoint })
    }

    /// Forward one frame for a verdict. `None` means "no verdict this
    /// tick" — the reason is logged, the loop moves on.
    pub async fn check(
        &self,
        frame: &CapturedFrame,
        voter_id: &str,
        election_id: &str,
    ) -> Option<RemoteVerdict> {
        match self.request(frame, voter_id, election_id).await {
            Ok(verdict) => {
                debug!(
                    "Security check verdict: violation={}, blocked={}",
                    verdict.violation, verdict.is_blocked
                );
                Some(verdict)
            }
            Err(e) => {
                warn!("Security check unavailable this tick: {:#}", e);
                None
            }
        }
    }

    async fn request(
        &self,
        frame: &CapturedFrame,
        voter_id: &str,
        election_id: &str,
    ) -> Result<RemoteVerdict> {
        let part = Part::bytes(frame.jpeg.clone())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .context("Invalid frame MIME type")?;

        let form = Form::new()
            .part("frame", part)
            .text("voterId", voter_id.to_string())
            .text("electionId", election_id.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach security-check service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("security-check service returned {}", status);
        }

        let verdict: RemoteVerdict = response
            .json()
            .await
            .context("Failed to parse security-check response")?;

        if !verdict.success {
            anyhow::bail!("security-check service reported failure");
        }

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parses_full_payload() {
        let verdict: RemoteVerdict = serde_json::from_str(
            r#"{
                "success": true,
                "violation": true,
                "violationType": "MULTIPLE_FACES",
                "message": "Two faces in frame",
                "isBlocked": false
            }"#,
        )
        .unwrap();
        assert!(verdict.success);
        assert!(verdict.violation);
        assert_eq!(verdict.violation_type, Some(RemoteViolationType::MultipleFaces));
        assert!(!verdict.is_blocked);
    }

    #[test]
    fn test_verdict_defaults_when_clean() {
        let verdict: RemoteVerdict = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(!verdict.violation);
        assert!(verdict.violation_type.is_none());
        assert!(!verdict.is_blocked);
    }

    #[test]
    fn test_face_mismatch_variant() {
        let verdict: RemoteVerdict = serde_json::from_str(
            r#"{"success": true, "violation": true, "violationType": "FACE_MISMATCH", "isBlocked": true}"#,
        )
        .unwrap();
        assert_eq!(verdict.violation_type, Some(RemoteViolationType::FaceMismatch));
        assert!(verdict.is_blocked);
    }
}
