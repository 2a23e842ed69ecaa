/// Session lifecycle tests
///
/// Exercises begin/execute/commit/abort/dispose and the composite
/// execute_transaction against the in-memory store.
/// Run with: cargo test --test session_lifecycle_tests
use serde_json::{Value, json};
use sessiontx::{
    ManagerOptions, MemoryStore, ResilientExecutor, SessionManager, StoreError, StoreOp,
    StoreSession, TransactionState, TxnError, TxnLogger,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingLogger {
    entries: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogger {
    fn record(&self, level: &'static str, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }

    fn count(&self, level: &str, fragment: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, m)| *l == level && m.contains(fragment))
            .count()
    }
}

impl TxnLogger for RecordingLogger {
    fn debug(&self, message: &str, _detail: Option<&Value>) {
        self.record("debug", message);
    }
    fn info(&self, message: &str, _detail: Option<&Value>) {
        self.record("info", message);
    }
    fn warn(&self, message: &str, _detail: Option<&Value>) {
        self.record("warn", message);
    }
    fn error(&self, message: &str, _detail: Option<&Value>) {
        self.record("error", message);
    }
}

fn manager_with_logger(
    store: &Arc<MemoryStore>,
) -> (SessionManager<MemoryStore>, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    let manager = SessionManager::with_options(
        Arc::clone(store),
        ManagerOptions::new().logger(logger.clone()),
    );
    (manager, logger)
}

#[tokio::test]
async fn test_transaction_commits_all_documents() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    let total = manager
        .execute_transaction(|session, _manager| {
            Box::pin(async move {
                session.insert("accounts/alice", json!({"balance": 70}))?;
                session.insert("accounts/bob", json!({"balance": 130}))?;
                session.insert("ledger/1", json!({"from": "alice", "to": "bob", "amount": 30}))?;
                Ok::<_, TxnError>(200)
            })
        })
        .await
        .unwrap();

    assert_eq!(total, 200);
    assert_eq!(store.len(), 3);
    assert_eq!(
        store.document("accounts/alice").unwrap(),
        Some(json!({"balance": 70}))
    );
    assert!(!manager.is_active());

    let stats = store.stats();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.aborts, 0);
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.sessions_ended, 1);
}

#[tokio::test]
async fn test_unit_failure_aborts_every_write() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, logger) = manager_with_logger(&store);

    let err = manager
        .execute_transaction(|session, _manager| {
            Box::pin(async move {
                session.insert("a", json!(1))?;
                session.insert("b", json!(2))?;
                Err::<(), _>(TxnError::Execution("insufficient funds".into()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TxnError::Execution(ref msg) if msg == "insufficient funds"));
    assert!(store.is_empty());

    let stats = store.stats();
    assert_eq!(stats.aborts, 1);
    assert_eq!(stats.sessions_ended, 1);
    assert_eq!(logger.count("error", "Unit of work failed"), 1);
}

#[tokio::test]
async fn test_unit_receives_manager_reference() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    let state = manager
        .execute_transaction(|session, manager| {
            Box::pin(async move {
                let current = manager.get_session()?;
                assert_eq!(current.id(), session.id());
                Ok::<_, TxnError>(manager.transaction_state())
            })
        })
        .await
        .unwrap();

    assert_eq!(state, Some(TransactionState::Active));
}

#[tokio::test]
async fn test_mutual_exclusion_on_begin() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    let session = manager.get_session().unwrap();
    session.insert("k", json!("pending")).unwrap();

    for _ in 0..3 {
        let err = manager.begin().await.err().unwrap();
        assert!(matches!(err, TxnError::AlreadyActive));
    }

    assert_eq!(manager.get_session().unwrap().id(), session.id());
    assert_eq!(session.staged_writes(), 1);
    assert_eq!(store.stats().sessions_started, 1);

    manager.commit().await.unwrap();
    manager.dispose().await;
    assert_eq!(store.document("k").unwrap(), Some(json!("pending")));
}

#[tokio::test]
async fn test_execute_transaction_does_not_touch_foreign_session() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    let err = manager
        .execute_transaction(|_session, _manager| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap_err();

    assert!(matches!(err, TxnError::AlreadyActive));
    assert!(manager.is_active());
    assert_eq!(manager.transaction_state(), Some(TransactionState::Active));
    assert_eq!(store.stats().sessions_ended, 0);

    manager.abort().await;
    manager.dispose().await;
}

#[tokio::test]
async fn test_no_session_guards_after_dispose() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    manager.dispose().await;

    assert!(matches!(manager.get_session(), Err(TxnError::NoActiveSession)));
    let err = manager
        .execute(|_session, _manager| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap_err();
    assert_eq!(err.name(), "NoActiveSessionError");
}

#[tokio::test]
async fn test_dispose_twice_equals_once() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    manager.dispose().await;
    let after_first = store.stats();

    manager.dispose().await;
    assert_eq!(store.stats(), after_first);
    assert_eq!(after_first.sessions_ended, 1);
}

#[tokio::test]
async fn test_dispose_warns_only_for_unfinished_transaction() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    manager.dispose().await;
    assert_eq!(logger.count("warn", "unfinished transaction"), 1);

    manager.begin().await.unwrap();
    manager.commit().await.unwrap();
    manager.dispose().await;
    assert_eq!(logger.count("warn", "unfinished transaction"), 1);
}

#[tokio::test]
async fn test_executor_rejects_usage_error_without_retry() {
    let store = Arc::new(MemoryStore::new());
    let logger = Arc::new(RecordingLogger::default());
    let mut executor = ResilientExecutor::with_options(
        Arc::clone(&store),
        ManagerOptions::new().logger(logger.clone()),
    );

    executor.begin().await.unwrap();
    let err = executor
        .execute_transaction(|_session, _manager| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap_err();

    assert!(matches!(err, TxnError::AlreadyActive));
    assert_eq!(logger.count("warn", "rejected by the session manager"), 1);
    assert_eq!(store.stats().sessions_started, 1);

    executor.abort().await;
    executor.dispose().await;
}

#[tokio::test]
async fn test_commit_failure_aborts_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, logger) = manager_with_logger(&store);
    store.fail_next(
        StoreOp::Commit,
        StoreError::new("UnknownTransactionCommitResult", "primary stepped down"),
    );

    let err = manager
        .execute_transaction(|session, _manager| {
            Box::pin(async move {
                session.insert("a", json!(1))?;
                Ok::<_, TxnError>(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.name(), "UnknownTransactionCommitResult");
    assert!(store.is_empty());

    let stats = store.stats();
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.aborts, 1);
    assert_eq!(stats.sessions_ended, 1);
    assert_eq!(logger.count("error", "Commit failed"), 1);
}

#[tokio::test]
async fn test_direct_commit_failure_auto_aborts() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager.begin().await.unwrap();
    store.fail_next(StoreOp::Commit, StoreError::new("WriteConcernFailed", "timeout"));

    let err = manager.commit().await.unwrap_err();
    assert_eq!(err.name(), "WriteConcernFailed");
    assert_eq!(manager.transaction_state(), Some(TransactionState::Aborted));
    assert!(!manager.get_session().unwrap().in_transaction());
    assert_eq!(store.stats().aborts, 1);

    manager.dispose().await;
}

#[tokio::test]
async fn test_abort_failure_never_masks_commit_error() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, logger) = manager_with_logger(&store);
    store.fail_next(StoreOp::Commit, StoreError::new("CommitFailed", "disk full"));
    store.fail_next(StoreOp::Abort, StoreError::new("AbortFailed", "network reset"));

    let err = manager
        .execute_transaction(|_session, _manager| Box::pin(async { Ok::<_, TxnError>(1) }))
        .await
        .unwrap_err();

    assert_eq!(err.name(), "CommitFailed");
    assert_eq!(err.message(), "disk full");
    // a second abort would have succeeded and been counted
    assert_eq!(store.stats().aborts, 0);
    assert_eq!(store.stats().sessions_ended, 1);
    assert_eq!(logger.count("error", "Abort failed"), 1);
}

#[tokio::test]
async fn test_abort_failure_never_masks_unit_error() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);
    store.fail_next(StoreOp::Abort, StoreError::new("AbortFailed", "network reset"));

    let err = manager
        .execute_transaction(|_session, _manager| {
            Box::pin(async { Err::<(), _>(TxnError::store("DuplicateKey", "orders/1")) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.name(), "DuplicateKey");
    assert_eq!(store.stats().sessions_ended, 1);
}

#[tokio::test]
async fn test_end_session_once_per_outcome() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    manager
        .execute_transaction(|_s, _m| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap();
    assert_eq!(store.stats().sessions_ended, 1);

    manager
        .execute_transaction(|_s, _m| {
            Box::pin(async { Err::<(), _>(TxnError::Execution("boom".into())) })
        })
        .await
        .unwrap_err();
    assert_eq!(store.stats().sessions_ended, 2);

    store.fail_next(StoreOp::Commit, StoreError::new("CommitFailed", "boom"));
    manager
        .execute_transaction(|_s, _m| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap_err();

    let stats = store.stats();
    assert_eq!(stats.sessions_started, 3);
    assert_eq!(stats.sessions_ended, 3);
    assert_eq!(stats.open_sessions(), 0);
}

#[tokio::test]
async fn test_start_session_failure_surfaces_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);
    store.fail_next(StoreOp::StartSession, StoreError::new("HostUnreachable", "no primary"));

    let err = manager
        .execute_transaction(|_s, _m| Box::pin(async { Ok::<_, TxnError>(()) }))
        .await
        .unwrap_err();

    assert_eq!(err.name(), "HostUnreachable");
    assert!(!manager.is_active());
    assert_eq!(store.stats().sessions_started, 0);
}

#[tokio::test]
async fn test_panicking_unit_still_releases_session() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _logger) = manager_with_logger(&store);
    let manager = Arc::new(tokio::sync::Mutex::new(manager));

    let task_manager = Arc::clone(&manager);
    let handle = tokio::spawn(async move {
        let mut manager = task_manager.lock().await;
        manager
            .execute_transaction(|session, _manager| {
                Box::pin(async move {
                    session.insert("a", json!(1))?;
                    if session.staged_writes() == 1 {
                        panic!("unit of work blew up");
                    }
                    Ok::<_, TxnError>(())
                })
            })
            .await
    });

    let join_err = handle.await.unwrap_err();
    assert!(join_err.is_panic());

    let manager = manager.lock().await;
    assert!(!manager.is_active());
    assert!(store.is_empty());
    assert_eq!(store.stats().aborts, 1);
    assert_eq!(store.stats().sessions_ended, 1);
}

#[tokio::test]
async fn test_manager_is_reusable_across_transactions() {
    let store = Arc::new(MemoryStore::new());
    let (mut manager, _logger) = manager_with_logger(&store);

    for i in 0..5 {
        manager
            .execute_transaction(move |session, _manager| {
                Box::pin(async move {
                    session.insert(&format!("items/{}", i), json!(i))?;
                    Ok::<_, TxnError>(())
                })
            })
            .await
            .unwrap();
    }

    assert_eq!(store.len(), 5);
    assert_eq!(store.stats().sessions_ended, 5);
}
