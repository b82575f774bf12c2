//! Session journal routes.

use axum::{
    extract::{Path, Query},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::db::{self, SessionRepository, ViolationRepository};

#[derive(Debug, Deserialize, Default)]
pub struct JournalQueryParams {
    /// Maximum results (default 20)
    pub limit: Option<usize>,
}

/// Create the journal router.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/:id", get(get_session_by_id))
}

/// GET /sessions - List recorded sessions, newest first.
async fn list_sessions(Query(params): Query<JournalQueryParams>) -> ApiResult<Json<Value>> {
    let conn = db::init_db().map_err(ApiError::from)?;
    let sessions = SessionRepository::list(&conn, params.limit.unwrap_or(20))
        .map_err(ApiError::from)?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// GET /sessions/:id - Get one session with its violations.
async fn get_session_by_id(Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let conn = db::init_db().map_err(ApiError::from)?;
    let session = SessionRepository::get(&conn, id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", id)))?;
    let violations = ViolationRepository::for_session(&conn, id).map_err(ApiError::from)?;

    Ok(Json(json!({
        "session": session,
        "violations": violations,
    })))
}
