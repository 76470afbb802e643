//! End-to-end session tests: a scripted fake bridge on localhost plus an
//! in-memory store, driven through full scan attempts.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use tessera_core::{EventKind, FacilityContext};
use tessera_scanner::BridgeClientConfig;
use tessera_session::{ScanSession, ScanSessionConfig, SessionError, SessionState};
use tessera_store::{Database, SqliteStudentRepository, Student, StudentRepository};

async fn setup_db() -> Database {
    Database::in_memory().await.unwrap()
}

async fn enroll(db: &Database, tag_id: &str) -> i64 {
    let student = Student {
        id: 0,
        tag_id: tag_id.to_string(),
        name: "Asha Rao".to_string(),
        allow_campus: true,
        allow_hostel: false,
        allow_library: false,
        allow_medical: false,
        allow_attendance: false,
        hostel_id: None,
        room: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    SqliteStudentRepository::new(db.pool().clone())
        .create(&student)
        .await
        .unwrap()
}

/// Fake bridge: expects a subscribe command, then writes the scripted scan
/// lines on the single accepted connection.
async fn spawn_bridge(lines: Vec<&'static str>) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);

        let mut subscribe = String::new();
        reader.read_line(&mut subscribe).await.unwrap();
        assert!(subscribe.contains("subscribe"));

        let stream = reader.get_mut();
        for line in lines {
            stream.write_all(line.as_bytes()).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
        }
        stream.flush().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    (addr, handle)
}

fn session_for(db: &Database, addr: std::net::SocketAddr, timeout: Duration) -> ScanSession {
    ScanSession::new(
        db.pool().clone(),
        FacilityContext::campus(),
        ScanSessionConfig {
            bridge: BridgeClientConfig {
                bridge_addr: addr,
                io_timeout: Duration::from_millis(1000),
            },
            scan_timeout: timeout,
        },
    )
}

#[tokio::test]
async fn granted_entry_then_exit_across_attempts() {
    let db = setup_db().await;
    enroll(&db, "04AB12CD").await;

    let (addr, bridge) = spawn_bridge(vec![
        r#"{"tagId":"04AB12CD"}"#,
        r#"{"tagId":"04AB12CD"}"#,
    ])
    .await;
    let mut session = session_for(&db, addr, Duration::from_secs(2));

    let first = session.run_attempt().await.unwrap();
    assert!(first.decision.is_granted());
    assert_eq!(first.decision.kind, EventKind::Entry);
    assert_eq!(first.tag_id, "04AB12CD");
    assert!(first.event.id > 0);
    assert_eq!(session.state(), &SessionState::Decided);

    // Second attempt reuses the open transport and toggles to exit
    let second = session.run_attempt().await.unwrap();
    assert_eq!(second.decision.kind, EventKind::Exit);
    assert_ne!(second.attempt_id, first.attempt_id);

    session.close().await;
    bridge.abort();
}

#[tokio::test]
async fn unknown_tag_is_a_decided_denial() {
    let db = setup_db().await;
    enroll(&db, "04AB12CD").await;

    let (addr, bridge) = spawn_bridge(vec![r#"{"uid":"DEADBEEF"}"#]).await;
    let mut session = session_for(&db, addr, Duration::from_secs(2));

    let outcome = session.run_attempt().await.unwrap();
    assert!(outcome.decision.is_denied());
    assert_eq!(outcome.decision.reason.as_deref(), Some("subject not found"));
    assert_eq!(outcome.event.student_id, None);
    assert_eq!(outcome.event.tag_id, "DEADBEEF");

    // A denial still ends in Decided; only infrastructure failures Fail
    assert_eq!(session.state(), &SessionState::Decided);

    session.close().await;
    bridge.abort();
}

#[tokio::test]
async fn variant_scan_resolves_through_session() {
    let db = setup_db().await;
    enroll(&db, "TAG-04ab12cd").await;

    let (addr, bridge) = spawn_bridge(vec![r#"{"tagId":"04AB12CD"}"#]).await;
    let mut session = session_for(&db, addr, Duration::from_secs(2));

    let outcome = session.run_attempt().await.unwrap();
    assert!(outcome.decision.is_granted());
    // The outcome reports the scanned form, the event keeps it too
    assert_eq!(outcome.tag_id, "04AB12CD");
    assert_eq!(outcome.event.tag_id, "04AB12CD");

    session.close().await;
    bridge.abort();
}

#[tokio::test]
async fn timeout_fails_attempt_and_closes_transport() {
    let db = setup_db().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let bridge = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut subscribe = String::new();
        reader.read_line(&mut subscribe).await.unwrap();
        // Never send a scan
        let _ = done_rx.await;
    });

    let mut session = session_for(&db, addr, Duration::from_millis(100));

    let result = session.run_attempt().await;
    assert!(matches!(result, Err(SessionError::ScanTimeout(100))));
    assert_eq!(session.state(), &SessionState::Failed);

    // The next attempt recovers from Failed on its own (fresh connect)
    let result = session.run_attempt().await;
    assert!(matches!(
        result,
        Err(SessionError::ScanTimeout(_)) | Err(SessionError::Transport(_))
    ));

    let _ = done_tx.send(());
    bridge.abort();
}

#[tokio::test]
async fn connect_failure_is_transport_error() {
    let db = setup_db().await;

    // Bind then drop for an address with no listener
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session = session_for(&db, addr, Duration::from_millis(500));

    let result = session.run_attempt().await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_eq!(session.state(), &SessionState::Failed);
}

#[tokio::test]
async fn rapid_rescan_loop_trips_stuck_valve() {
    let db = setup_db().await;

    // Bridge that accepts any number of connections but never sends a scan
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bridge = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                    line.clear();
                }
            });
        }
    });

    let mut session = session_for(&db, addr, Duration::from_millis(20));

    // Four rapid timeouts, then the valve fires on the fifth scan start
    for _ in 0..4 {
        let result = session.run_attempt().await;
        assert!(matches!(result, Err(SessionError::ScanTimeout(_))));
    }

    let result = session.run_attempt().await;
    assert!(matches!(result, Err(SessionError::StuckLoop)));
    assert_eq!(session.state(), &SessionState::Idle);

    bridge.abort();
}

#[tokio::test]
async fn reset_returns_to_idle_from_decided() {
    let db = setup_db().await;
    enroll(&db, "04AB12CD").await;

    let (addr, bridge) = spawn_bridge(vec![r#"{"tagId":"04AB12CD"}"#]).await;
    let mut session = session_for(&db, addr, Duration::from_secs(2));

    session.run_attempt().await.unwrap();
    assert_eq!(session.state(), &SessionState::Decided);

    session.reset().await;
    assert_eq!(session.state(), &SessionState::Idle);

    bridge.abort();
}
