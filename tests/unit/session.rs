use std::io::{BufReader, BufWriter};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::HpssConfig;
use crate::error::HpssError;
use crate::session::{ping, Session, SessionManager};

/// A harmless live child standing in for an hsi process.
fn cat_session(owner_pid: u32) -> Session {
    let mut child = Command::new("cat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn cat");
    let stdin = BufWriter::new(child.stdin.take().expect("cat stdin"));
    let stdout = BufReader::new(child.stdout.take().expect("cat stdout"));
    Session {
        child,
        stdin,
        stdout,
        owner_pid,
        root: "/hpss/home/test".to_string(),
        sentinel: "SENT".to_string(),
    }
}

/// Config whose binary can never spawn, with a tight bounded retry.
fn unconnectable_config() -> HpssConfig {
    HpssConfig::new("archive", "/nonexistent/keytab", "test")
        .with_binary("/nonexistent/hsi-binary")
        .with_connect_retry(Duration::from_millis(1))
        .with_connect_attempts(1)
}

#[test]
fn stale_owner_is_discarded_not_reused() {
    let mut manager = SessionManager::new(unconnectable_config());
    manager.session = Some(cat_session(std::process::id().wrapping_add(1)));

    // The recorded owner differs from this process, so the session must
    // be dropped; with an unconnectable binary the bounded retry then
    // surfaces a connection error instead of reusing the old child.
    let err = manager.ensure_ready().unwrap_err();
    assert!(matches!(err, HpssError::Connection(_)), "got {err:?}");
    assert!(manager.session.is_none());
}

#[test]
fn dead_child_is_detected() {
    let mut session = cat_session(std::process::id());
    session.child.kill().expect("kill");
    session.child.wait().expect("wait");

    let mut manager = SessionManager::new(unconnectable_config());
    manager.session = Some(session);

    let err = manager.ensure_ready().unwrap_err();
    assert!(matches!(err, HpssError::Connection(_)), "got {err:?}");
    assert!(manager.session.is_none());
}

#[test]
fn live_session_is_reused() {
    let session = cat_session(std::process::id());
    let child_id = session.child.id();

    let mut manager = SessionManager::new(unconnectable_config());
    manager.session = Some(session);

    let session = manager.ensure_ready().expect("live session");
    assert_eq!(session.child.id(), child_id);
}

#[test]
fn bounded_retry_reports_attempt_count() {
    let mut manager =
        SessionManager::new(unconnectable_config().with_connect_attempts(3));
    let err = manager.ensure_ready().unwrap_err();
    let HpssError::Connection(message) = err else {
        panic!("expected connection error");
    };
    assert!(message.contains("3 attempts"), "got {message}");
}

#[test]
fn ping_fails_without_a_binary() {
    assert!(!ping(&unconnectable_config()));
}
