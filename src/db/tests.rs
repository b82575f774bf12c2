use chrono::Utc;
use rusqlite::Connection;

use super::sessions::{SessionOutcome, SessionRepository, ViolationRepository};
use super::migrate;
use crate::policy::{Severity, ViolationEvent, ViolationType};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory db");
    migrate(&conn).expect("migrate");
    conn
}

fn warn_event() -> ViolationEvent {
    ViolationEvent {
        violation_type: ViolationType::MultipleFaces,
        severity: Severity::Warn,
        message: "1st warning: multiple faces detected".into(),
        warnings_count: 1,
        reason: None,
        audit_ref: None,
        at: Utc::now(),
    }
}

#[test]
fn test_insert_and_get_session() {
    let conn = test_db();
    let id = SessionRepository::insert(&conn, "uuid-1", "voter1", "election1").unwrap();

    let record = SessionRepository::get(&conn, id).unwrap().expect("session exists");
    assert_eq!(record.session_uuid, "uuid-1");
    assert_eq!(record.voter_id, "voter1");
    assert_eq!(record.election_id, "election1");
    assert!(record.outcome.is_none());
    assert!(record.ended_at.is_none());
}

#[test]
fn test_finish_session_records_outcome() {
    let conn = test_db();
    let id = SessionRepository::insert(&conn, "uuid-2", "voter2", "election1").unwrap();

    SessionRepository::finish(&conn, id, SessionOutcome::Blocked, Some("audit_voter2_election1_1"))
        .unwrap();

    let record = SessionRepository::get(&conn, id).unwrap().unwrap();
    assert_eq!(record.outcome.as_deref(), Some("blocked"));
    assert_eq!(record.audit_ref.as_deref(), Some("audit_voter2_election1_1"));
    assert!(record.ended_at.is_some());
}

#[test]
fn test_get_missing_session() {
    let conn = test_db();
    assert!(SessionRepository::get(&conn, 999).unwrap().is_none());
}

#[test]
fn test_list_sessions_newest_first() {
    let conn = test_db();
    for i in 0..5 {
        SessionRepository::insert(&conn, &format!("uuid-{i}"), "voter", "election").unwrap();
    }

    let records = SessionRepository::list(&conn, 3).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].session_uuid, "uuid-4");
}

#[test]
fn test_violations_round_trip() {
    let conn = test_db();
    let session_id = SessionRepository::insert(&conn, "uuid-3", "voter3", "election1").unwrap();

    ViolationRepository::insert(&conn, session_id, &warn_event()).unwrap();

    let mut block = warn_event();
    block.severity = Severity::Block;
    block.warnings_count = 3;
    block.audit_ref = Some("audit_voter3_election1_9".into());
    ViolationRepository::insert(&conn, session_id, &block).unwrap();

    let records = ViolationRepository::for_session(&conn, session_id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].severity, "warn");
    assert_eq!(records[1].severity, "block");
    assert_eq!(records[1].audit_ref.as_deref(), Some("audit_voter3_election1_9"));
    assert_eq!(records[1].violation_type, "multiple_faces");
}

#[test]
fn test_violations_scoped_to_session() {
    let conn = test_db();
    let a = SessionRepository::insert(&conn, "uuid-a", "voterA", "election1").unwrap();
    let b = SessionRepository::insert(&conn, "uuid-b", "voterB", "election1").unwrap();

    ViolationRepository::insert(&conn, a, &warn_event()).unwrap();

    assert_eq!(ViolationRepository::for_session(&conn, a).unwrap().len(), 1);
    assert!(ViolationRepository::for_session(&conn, b).unwrap().is_empty());
}
