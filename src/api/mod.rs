//! REST API server for Scrutineer.
//!
//! Provides HTTP endpoints for:
//! - Session control (start, complete, cancel)
//! - Frame ingest from the voting UI
//! - Ballot progress reporting
//! - Live session status
//! - Session journal queries

pub mod error;
pub mod routes;

use crate::config::Config;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::session::{ApiCommand, SessionRoutesState, StartRequest};

pub struct ApiServer {
    port: u16,
    session_state: SessionRoutesState,
}

impl ApiServer {
    pub fn new(
        tx: tokio::sync::mpsc::Sender<ApiCommand>,
        status: crate::session::SessionStatusHandle,
        frames: crate::media::FramePipe,
        config: &Config,
    ) -> Self {
        Self {
            port: config.api.port,
            session_state: SessionRoutesState { tx, status, frames },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            // Root and version endpoints
            .route("/", get(status))
            .route("/version", get(version))
            // Session control endpoints
            .nest("", routes::session::router(self.session_state))
            // Journal queries
            .nest("/sessions", routes::journal::router())
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                 - Service info");
        info!("  GET  /version          - Get version info");
        info!("  POST /session/start    - Start a monitored session");
        info!("  POST /session/frame    - Push one camera frame");
        info!("  POST /session/progress - Report ballot progress");
        info!("  POST /session/complete - Complete the session");
        info!("  POST /session/cancel   - Cancel the session");
        info!("  GET  /session/status   - Live session status");
        info!("  GET  /sessions         - List recorded sessions");
        info!("  GET  /sessions/:id     - One session with violations");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "scrutineer",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "scrutineer"
    }))
}
