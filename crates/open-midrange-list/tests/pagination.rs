//! Session-level pagination against a simulated host.

mod support;

use open_midrange_list::{ErrorKind, ListConfig, ListError, Operation, SessionState};
use support::{entry, fast_config, init_tracing, SimulatedHost};

#[test]
fn test_fetch_all_in_blocks() {
    init_tracing();
    let host = SimulatedHost::new(250);
    let mut session = host.open_session(fast_config(100));
    assert_eq!(session.total_records(), Some(250));

    let entries = session.fetch_all().unwrap();
    assert_eq!(entries.len(), 250);
    assert_eq!(entries[0], entry(1));
    assert_eq!(entries[249], entry(250));
    assert_eq!(session.state(), SessionState::Closed);

    let state = host.state();
    assert_eq!(state.gets, vec![(100, 1), (100, 101), (50, 201)]);
    assert_eq!(state.closes, 1);
    assert_eq!(state.programs, ["QGYOLOBJ", "QGYGTLE", "QGYGTLE", "QGYGTLE", "QGYCLST"]);
}

#[test]
fn test_short_replies_still_cover_every_entry() {
    init_tracing();
    let host = SimulatedHost::new(101);
    host.state().partition = vec![7, 1, 33, 12];
    let mut session = host.open_session(fast_config(20));

    let ids: Vec<i64> = session
        .fetch_all()
        .unwrap()
        .iter()
        .map(|e| e.get_i64("id").unwrap())
        .collect();
    assert_eq!(ids, (1..=101).collect::<Vec<_>>());

    // Each request starts right after the last entry received.
    let gets = host.state().gets.clone();
    assert_eq!(gets[0], (20, 1));
    assert_eq!(gets[1], (20, 8));
    assert_eq!(gets[2], (20, 9));
}

#[test]
fn test_open_prefetch_is_used() {
    init_tracing();
    let host = SimulatedHost::new(45);
    host.state().open_returns = 30;
    let mut session = host.open_session(fast_config(10));

    let entries = session.fetch_all().unwrap();
    assert_eq!(entries.len(), 45);
    assert_eq!(entries[30], entry(31));
    assert_eq!(host.state().gets, vec![(10, 31), (5, 41)]);
}

#[test]
fn test_empty_list() {
    let host = SimulatedHost::new(0);
    let mut session = host.open_session(fast_config(100));
    assert!(session.fetch_all().unwrap().is_empty());
    assert!(host.state().gets.is_empty());
    assert_eq!(host.state().closes, 1);
}

#[test]
fn test_lock_cleared_before_bound() {
    init_tracing();
    let host = SimulatedHost::new(5);
    host.state().locks_remaining = 4;
    let mut session = host.open_session(fast_config(100));

    assert_eq!(session.fetch_all().unwrap().len(), 5);
    assert_eq!(host.state().gets.len(), 5);
}

#[test]
fn test_lock_never_clears() {
    init_tracing();
    let host = SimulatedHost::new(5);
    host.state().locks_remaining = usize::MAX;
    let mut session = host.open_session(fast_config(100));

    let err = session.fetch_all().unwrap_err();
    assert!(matches!(
        err,
        ListError::LockTimeout {
            operation: Operation::GetEntries,
            attempts: 5,
            ..
        }
    ));
    assert_eq!(err.message_ids(), ["CPF9803".to_string()]);
    assert_eq!(host.state().gets.len(), 5);
    // The list is still released.
    assert_eq!(host.state().closes, 1);
}

#[test]
fn test_lock_ids_are_configurable() {
    let host = SimulatedHost::new(5);
    host.state().locks_remaining = 1;
    let config = ListConfig {
        lock_message_ids: vec!["CPF3202".to_string()],
        ..fast_config(100)
    };
    let mut session = host.open_session(config);

    let err = session.fetch_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HostFailure);
    assert_eq!(host.state().gets.len(), 1);
}

#[test]
fn test_overshoot_detected() {
    let host = SimulatedHost::new(50);
    host.state().overshoot = true;
    let mut session = host.open_session(fast_config(10));

    let err = session.fetch_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InconsistentListState);
    assert_eq!(host.state().closes, 1);
}

#[test]
fn test_stall_detected() {
    let host = SimulatedHost::new(50);
    host.state().stall_at = Some(21);
    let mut session = host.open_session(fast_config(10));

    let err = session.fetch_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InconsistentListState);
    assert_eq!(host.state().gets, vec![(10, 1), (10, 11), (10, 21)]);
}

#[test]
fn test_total_drift_detected() {
    let host = SimulatedHost::new(50);
    host.state().drift = true;
    let mut session = host.open_session(fast_config(10));
    assert!(matches!(
        session.get_entries(10, 1),
        Err(ListError::InconsistentListState { .. })
    ));
    session.close().unwrap();
}

#[test]
fn test_close_failure_reported() {
    let host = SimulatedHost::new(3);
    host.state().reject_close = true;
    let mut session = host.open_session(fast_config(10));

    let err = session.fetch_all().unwrap_err();
    assert!(matches!(
        err,
        ListError::HostFailure {
            operation: Operation::Close,
            ..
        }
    ));
    assert_eq!(err.message_ids(), ["GUI0002".to_string()]);
    assert_eq!(session.state(), SessionState::Closed);
    // A second close does not call the host again.
    session.close().unwrap();
    assert_eq!(host.state().closes, 1);
}

#[test]
fn test_manual_paging() {
    let host = SimulatedHost::new(12);
    let mut session = host.open_session(fast_config(5));

    let chunk = session.get_entries(5, 6).unwrap();
    assert_eq!(chunk.len(), 5);
    assert_eq!(chunk.status.first_record, 6);
    let entries = session.decode_entries(&chunk).unwrap();
    assert_eq!(entries[0], entry(6));
    assert_eq!(entries[4].get_text("name"), Some("E00010"));

    let tail = session.get_entries(5, 11).unwrap();
    assert_eq!(tail.len(), 2);
    session.close().unwrap();
    assert!(matches!(
        session.get_entries(1, 1),
        Err(ListError::SessionClosed { .. })
    ));
}

#[test]
fn test_config_from_json() {
    let config: ListConfig = serde_json::from_str(
        r#"{"max_attempts": 2, "retry_delay_ms": 0, "lock_message_ids": ["CPF9803"]}"#,
    )
    .unwrap();
    let host = SimulatedHost::new(5);
    host.state().locks_remaining = usize::MAX;
    let mut session = host.open_session(config);

    let err = session.fetch_all().unwrap_err();
    assert!(matches!(err, ListError::LockTimeout { attempts: 2, .. }));
    assert_eq!(host.state().gets.len(), 2);
}
