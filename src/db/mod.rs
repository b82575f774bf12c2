//! Local session journal.
//!
//! SQLite record of monitored sessions and the violation events they
//! produced. This is operator-facing history only — the authoritative
//! audit trail is the remote store the uploader posts to.

pub mod sessions;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub use sessions::{SessionOutcome, SessionRecord, SessionRepository, ViolationRecord, ViolationRepository};

pub fn init_db() -> Result<Connection> {
    let db_path = crate::global::db_file()?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(&db_path).context("Failed to open database connection")?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_uuid TEXT NOT NULL,
            voter_id TEXT NOT NULL,
            election_id TEXT NOT NULL,
            outcome TEXT,
            audit_ref TEXT,
            started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            ended_at TIMESTAMP
        )",
        [],
    )
    .context("Failed to create sessions table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS violations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id),
            violation_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            warnings_count INTEGER NOT NULL DEFAULT 0,
            audit_ref TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create violations table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at DESC)",
        [],
    )
    .context("Failed to create index on sessions")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_violations_session ON violations(session_id)",
        [],
    )
    .context("Failed to create index on violations")?;

    Ok(())
}
