use crate::api::{ApiCommand, ApiServer};
use crate::config::Config;
use crate::detect::ClientDetectionAnalyzer;
use crate::evidence::{AuditUploader, EvidenceSink};
use crate::media::{DeviceBackend, FramePipe};
use crate::security::RemoteSecurityCheck;
use crate::session::{LoggingEvents, SessionController, SessionDeps, SessionStatusHandle};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting Scrutineer service");

    let config = Config::load()?;

    let (tx, mut rx) = mpsc::channel::<ApiCommand>(10);
    let frames = FramePipe::new();
    let status = SessionStatusHandle::default();

    let api_server = ApiServer::new(tx, status.clone(), frames.clone(), &config);
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("Scrutineer is ready!");
    info!(
        "Start a session with: curl -X POST http://127.0.0.1:{}/session/start \
         -H 'Content-Type: application/json' \
         -d '{{\"voterId\":\"v1\",\"electionId\":\"e1\"}}'",
        config.api.port
    );

    let mut active: Option<SessionController> = None;

    while let Some(command) = rx.recv().await {
        match command {
            ApiCommand::StartSession {
                voter_id,
                election_id,
            } => {
                if active.is_some() && !status.get().await.phase.is_terminal() {
                    error!("A session is already active; start request ignored");
                    continue;
                }

                let deps = build_deps(&config, frames.clone(), status.clone());
                match SessionController::start(config.clone(), deps, &voter_id, &election_id).await
                {
                    Ok(controller) => {
                        info!("Session {} started", controller.session_uuid());
                        active = Some(controller);
                    }
                    Err(e) => error!("Failed to start session: {:#}", e),
                }
            }
            ApiCommand::CompleteSession { candidate_id } => match &active {
                Some(controller) => {
                    if let Err(e) = controller.complete(&candidate_id).await {
                        error!("Failed to complete session: {:#}", e);
                    }
                }
                None => error!("No active session to complete"),
            },
            ApiCommand::CancelSession => match &active {
                Some(controller) => {
                    if let Err(e) = controller.cancel().await {
                        error!("Failed to cancel session: {:#}", e);
                    }
                }
                None => error!("No active session to cancel"),
            },
        }
    }

    Ok(())
}

fn build_deps(config: &Config, frames: FramePipe, status: SessionStatusHandle) -> SessionDeps {
    let timeout = Duration::from_secs(config.security.request_timeout_secs);

    let remote = config.security.check_endpoint.clone().and_then(|endpoint| {
        match RemoteSecurityCheck::new(endpoint, timeout) {
            Ok(check) => Some(Arc::new(check)),
            Err(e) => {
                warn!("Remote security check disabled: {:#}", e);
                None
            }
        }
    });

    let sink: Option<Arc<dyn EvidenceSink>> =
        config.security.audit_endpoint.clone().and_then(|endpoint| {
            match AuditUploader::new(endpoint, timeout) {
                Ok(uploader) => Some(Arc::new(uploader) as Arc<dyn EvidenceSink>),
                Err(e) => {
                    warn!("Evidence upload disabled: {:#}", e);
                    None
                }
            }
        });

    if remote.is_none() {
        info!("No security-check endpoint configured; running local detectors only");
    }

    SessionDeps {
        backend: Box::new(DeviceBackend::new(frames)),
        analyzer: Arc::new(ClientDetectionAnalyzer),
        remote,
        sink,
        events: Arc::new(LoggingEvents),
        status,
        journal: true,
    }
}
