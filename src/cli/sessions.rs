use anyhow::{anyhow, Result};

use crate::db::{self, SessionRepository, ViolationRepository};

use super::args::SessionsCliArgs;

pub fn handle_sessions_command(args: SessionsCliArgs) -> Result<()> {
    let conn = db::init_db()?;

    if let Some(id) = args.id {
        let session = SessionRepository::get(&conn, id)?
            .ok_or_else(|| anyhow!("Session with ID {} not found", id))?;

        println!("Session #{} ({})", session.id, session.session_uuid);
        println!("  Voter:    {}", session.voter_id);
        println!("  Election: {}", session.election_id);
        println!(
            "  Outcome:  {}",
            session.outcome.as_deref().unwrap_or("in progress")
        );
        if let Some(audit_ref) = &session.audit_ref {
            println!("  Audit:    {}", audit_ref);
        }
        println!("  Started:  {}", session.started_at);
        if let Some(ended_at) = &session.ended_at {
            println!("  Ended:    {}", ended_at);
        }

        let violations = ViolationRepository::for_session(&conn, id)?;
        if violations.is_empty() {
            println!("\nNo violations recorded.");
        } else {
            println!("\n{} violation(s):", violations.len());
            for v in violations {
                println!(
                    "  [{}] {} ({}): {}",
                    v.created_at, v.violation_type, v.severity, v.message
                );
            }
        }
        return Ok(());
    }

    let sessions = SessionRepository::list(&conn, args.limit)?;
    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    println!("Found {} session(s):\n", sessions.len());
    for session in sessions {
        println!(
            "#{:<4} {}  voter {}  election {}  {}",
            session.id,
            session.started_at,
            session.voter_id,
            session.election_id,
            session.outcome.as_deref().unwrap_or("in progress"),
        );
    }

    Ok(())
}
