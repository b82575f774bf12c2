//! Callbacks surfaced to the embedding application.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::policy::ViolationEvent;

/// What the surrounding voting UI gets told. The service binary logs;
/// an embedder (or a test) provides its own implementation.
#[async_trait]
pub trait SessionEvents: Send + Sync {
    async fn on_security_violation(&self, message: &str, details: &ViolationEvent);

    async fn on_voting_complete(&self, candidate_id: &str);

    async fn on_cancel(&self);
}

/// Default implementation for the standalone service.
pub struct LoggingEvents;

#[async_trait]
impl SessionEvents for LoggingEvents {
    async fn on_security_violation(&self, message: &str, details: &ViolationEvent) {
        warn!(
            "Security violation ({}, {}): {}",
            details.violation_type.as_str(),
            details.severity.as_str(),
            message
        );
    }

    async fn on_voting_complete(&self, candidate_id: &str) {
        info!("Vote completed for candidate {}", candidate_id);
    }

    async fn on_cancel(&self) {
        info!("Voting session cancelled");
    }
}
