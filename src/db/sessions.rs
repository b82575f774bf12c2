//! Session and violation persistence. Raw SQL with rusqlite, no ORM.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::policy::ViolationEvent;

/// How a monitored session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Blocked,
    ManualReview,
    Cancelled,
    Simulation,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::ManualReview => "manual_review",
            Self::Cancelled => "cancelled",
            Self::Simulation => "simulation",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_uuid: String,
    pub voter_id: String,
    pub election_id: String,
    pub outcome: Option<String>,
    pub audit_ref: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ViolationRecord {
    pub id: i64,
    pub session_id: i64,
    pub violation_type: String,
    pub severity: String,
    pub message: String,
    pub warnings_count: i64,
    pub audit_ref: Option<String>,
    pub created_at: String,
}

pub struct SessionRepository;

impl SessionRepository {
    /// Insert a newly started session. Returns the journal row id.
    pub fn insert(
        conn: &Connection,
        session_uuid: &str,
        voter_id: &str,
        election_id: &str,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO sessions (session_uuid, voter_id, election_id) VALUES (?1, ?2, ?3)",
            params![session_uuid, voter_id, election_id],
        )
        .context("Failed to insert session")?;
        Ok(conn.last_insert_rowid())
    }

    /// Record how the session ended.
    pub fn finish(
        conn: &Connection,
        id: i64,
        outcome: SessionOutcome,
        audit_ref: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET outcome = ?1, audit_ref = ?2, ended_at = CURRENT_TIMESTAMP \
             WHERE id = ?3",
            params![outcome.as_str(), audit_ref, id],
        )
        .context("Failed to finish session")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<SessionRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, session_uuid, voter_id, election_id, outcome, audit_ref, \
                 started_at, ended_at FROM sessions WHERE id = ?1",
            )
            .context("Failed to prepare session query")?;

        let mut rows = stmt
            .query_map(params![id], Self::map_row)
            .context("Failed to query session")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Most recent sessions, newest first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, session_uuid, voter_id, election_id, outcome, audit_ref, \
                 started_at, ended_at FROM sessions ORDER BY started_at DESC, id DESC LIMIT ?1",
            )
            .context("Failed to prepare session list query")?;

        let rows = stmt
            .query_map(params![limit as i64], Self::map_row)
            .context("Failed to list sessions")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get(0)?,
            session_uuid: row.get(1)?,
            voter_id: row.get(2)?,
            election_id: row.get(3)?,
            outcome: row.get(4)?,
            audit_ref: row.get(5)?,
            started_at: row.get(6)?,
            ended_at: row.get(7)?,
        })
    }
}

pub struct ViolationRepository;

impl ViolationRepository {
    pub fn insert(conn: &Connection, session_id: i64, event: &ViolationEvent) -> Result<i64> {
        conn.execute(
            "INSERT INTO violations (session_id, violation_type, severity, message, \
             warnings_count, audit_ref) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                event.violation_type.as_str(),
                event.severity.as_str(),
                event.message,
                event.warnings_count as i64,
                event.audit_ref,
            ],
        )
        .context("Failed to insert violation")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn for_session(conn: &Connection, session_id: i64) -> Result<Vec<ViolationRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, violation_type, severity, message, warnings_count, \
                 audit_ref, created_at FROM violations WHERE session_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare violation query")?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(ViolationRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    violation_type: row.get(2)?,
                    severity: row.get(3)?,
                    message: row.get(4)?,
                    warnings_count: row.get(5)?,
                    audit_ref: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .context("Failed to query violations")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
