//! Evidence upload to the audit store.
//!
//! At most one attempt per block event. Upload failure is logged and the
//! local block stands — the audit store is for review, not for deciding.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{info, warn};

use super::EvidenceRecord;

/// Where evidence goes. The production sink posts to the audit store;
/// tests substitute a collector.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn upload(&self, record: &EvidenceRecord) -> Result<()>;
}

pub struct AuditUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl AuditUploader {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build audit upload HTTP client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EvidenceSink for AuditUploader {
    async fn upload(&self, record: &EvidenceRecord) -> Result<()> {
        let mut form = Form::new()
            .text("voterId", record.voter_id.clone())
            .text("electionId", record.election_id.clone())
            .text("reason", record.reason.clone())
            .text("auditRef", record.audit_ref.clone())
            .text("meta", record.meta.to_string());

        if let Some(path) = &record.bundle_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let part = Part::bytes(bytes)
                        .file_name("evidence.tar.gz")
                        .mime_str("application/gzip")
                        .context("Invalid evidence MIME type")?;
                    form = form.part("video", part);
                }
                Err(e) => {
                    // Metadata alone is still worth filing.
                    warn!("Evidence bundle unreadable, uploading metadata only: {}", e);
                }
            }
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach audit store")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("audit store returned {}", status);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({}));

        info!(
            "Evidence {} filed with audit store (id: {})",
            record.audit_ref,
            body.get("id").map(|v| v.to_string()).unwrap_or_else(|| "?".into())
        );
        Ok(())
    }
}
