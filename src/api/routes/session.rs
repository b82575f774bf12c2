//! Session control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting a session (POST /session/start)
//! - Pushing UI frames into the monitor (POST /session/frame)
//! - Reporting ballot progress (POST /session/progress)
//! - Completing or cancelling (POST /session/complete, /session/cancel)
//! - Observing live status (GET /session/status)

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::detect::{DetectionSample, FaceBox};
use crate::media::{CapturedFrame, FramePipe};
use crate::session::SessionStatusHandle;

/// Commands the route handlers forward to the service loop.
#[derive(Debug, Clone)]
pub enum ApiCommand {
    StartSession {
        voter_id: String,
        election_id: String,
    },
    CompleteSession {
        candidate_id: String,
    },
    CancelSession,
}

#[derive(Clone)]
pub struct SessionRoutesState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub status: SessionStatusHandle,
    pub frames: FramePipe,
}

/// Request body for starting a session.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub voter_id: String,
    pub election_id: String,
}

/// Request body for completing a session.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub candidate_id: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ProgressRequest {
    pub progress: u8,
}

/// Per-frame detection results the UI computed client-side, if any.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetection {
    pub face_count: u32,
    #[serde(default)]
    pub face_boxes: Vec<FaceBox>,
    #[serde(default)]
    pub liveness_scores: Vec<f32>,
    #[serde(default)]
    pub face_confidence_min: f32,
}

/// Request body for pushing one frame into the monitor.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRequest {
    /// JPEG bytes, base64-encoded.
    pub frame: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detection: Option<FrameDetection>,
}

/// Creates the session router with all session-related endpoints.
pub fn router(state: SessionRoutesState) -> Router {
    Router::new()
        .route("/session/start", post(start_session))
        .route("/session/frame", post(push_frame))
        .route("/session/progress", post(set_progress))
        .route("/session/complete", post(complete_session))
        .route("/session/cancel", post(cancel_session))
        .route("/session/status", get(session_status))
        .with_state(state)
}

async fn start_session(
    State(state): State<SessionRoutesState>,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<Value>> {
    if req.voter_id.is_empty() || req.election_id.is_empty() {
        return Err(ApiError::bad_request("voterId and electionId are required"));
    }

    // One session at a time.
    let current = state.status.get().await;
    if current.voter_id.is_some() && !current.phase.is_terminal() {
        return Err(ApiError::conflict("a session is already active"));
    }

    info!(
        "Start session command received via API for voter {} in election {}",
        req.voter_id, req.election_id
    );

    send_command(
        &state,
        ApiCommand::StartSession {
            voter_id: req.voter_id,
            election_id: req.election_id,
        },
    )
    .await
}

async fn complete_session(
    State(state): State<SessionRoutesState>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<Value>> {
    if req.candidate_id.is_empty() {
        return Err(ApiError::bad_request("candidateId is required"));
    }

    info!("Complete session command received via API");
    send_command(
        &state,
        ApiCommand::CompleteSession {
            candidate_id: req.candidate_id,
        },
    )
    .await
}

async fn cancel_session(State(state): State<SessionRoutesState>) -> ApiResult<Json<Value>> {
    info!("Cancel session command received via API");
    send_command(&state, ApiCommand::CancelSession).await
}

async fn send_command(state: &SessionRoutesState, command: ApiCommand) -> ApiResult<Json<Value>> {
    match state.tx.send(command).await {
        Ok(_) => {
            // Small delay to allow the status to be updated
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

            let status = state.status.get().await;
            Ok(Json(json!({
                "success": true,
                "phase": status.phase.as_str(),
                "message": status.message,
            })))
        }
        Err(e) => {
            error!("Failed to send session command: {}", e);
            Err(ApiError::internal("service loop unavailable"))
        }
    }
}

/// Accepts one camera frame from the UI. The pipe keeps only the most
/// recent frame; the video loop consumes it on its next tick.
async fn push_frame(
    State(state): State<SessionRoutesState>,
    Json(req): Json<FrameRequest>,
) -> ApiResult<Json<Value>> {
    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(&req.frame)
        .map_err(|e| ApiError::bad_request(format!("frame is not valid base64: {}", e)))?;
    if jpeg.is_empty() {
        return Err(ApiError::bad_request("frame payload is empty"));
    }

    let now = Utc::now();
    let detection = req.detection.map(|d| DetectionSample {
        timestamp: now,
        face_count: d.face_count,
        face_boxes: d.face_boxes,
        liveness_scores: d.liveness_scores,
        face_confidence_min: d.face_confidence_min,
    });

    debug!(
        "Frame received: {} bytes, {}x{}, detection: {}",
        jpeg.len(),
        req.width,
        req.height,
        detection.is_some()
    );

    state.frames.push(CapturedFrame {
        captured_at: now,
        jpeg,
        width: req.width,
        height: req.height,
        detection,
    });

    Ok(Json(json!({ "success": true })))
}

async fn set_progress(
    State(state): State<SessionRoutesState>,
    Json(req): Json<ProgressRequest>,
) -> ApiResult<Json<Value>> {
    state.status.set_progress(req.progress).await;
    Ok(Json(json!({ "success": true })))
}

/// Gets the live session status.
async fn session_status(State(state): State<SessionRoutesState>) -> Json<Value> {
    let status = state.status.get().await;

    Json(json!({
        "phase": status.phase.as_str(),
        "message": status.message,
        "voterId": status.voter_id,
        "electionId": status.election_id,
        "audioLevel": status.audio_level,
        "faceDetected": status.face_detected,
        "multipleFaces": status.multiple_faces,
        "fraudDetected": status.fraud_detected,
        "votingProgress": status.voting_progress,
        "warnings": status.warnings,
        "auditRef": status.audit_ref,
    }))
}
