use crate::connection::config::TransactionOptions;
use crate::connection::{SessionSource, StoreSession};
use crate::core::{Result, StoreError};
use crate::transaction::retry::TRANSIENT_TRANSACTION_ERROR;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Store operation that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    StartSession,
    StartTransaction,
    Commit,
    Abort,
    EndSession,
}

/// Lifecycle counters of a `MemoryStore`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sessions_started: usize,
    pub sessions_ended: usize,
    pub transactions_started: usize,
    pub commits: usize,
    pub aborts: usize,
}

impl StoreStats {
    pub fn open_sessions(&self) -> usize {
        self.sessions_started.saturating_sub(self.sessions_ended)
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Store Stats: {}/{} sessions open, {} transactions, {} commits, {} aborts",
            self.open_sessions(),
            self.sessions_started,
            self.transactions_started,
            self.commits,
            self.aborts
        )
    }
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, Value>,
    /// Document key -> id of the session whose open transaction wrote it
    write_locks: HashMap<String, String>,
    faults: HashMap<StoreOp, VecDeque<StoreError>>,
    stats: StoreStats,
}

impl StoreState {
    fn take_fault(&mut self, op: StoreOp) -> Result<()> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn release_locks(&mut self, session_id: &str) {
        self.write_locks.retain(|_, holder| holder != session_id);
    }
}

/// In-memory multi-document store
///
/// Sessions stage their writes and apply them atomically on commit; abort
/// discards them. Concurrent transactions writing the same key conflict on a
/// first-writer-wins basis with a `WriteConflict` error labelled
/// `TransientTransactionError`.
///
/// Cloning a `MemoryStore` yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call of `op`
    ///
    /// Failures queued for the same operation are returned in order, one per
    /// call. A failed commit or abort leaves the transaction open.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.lock().faults.entry(op).or_default().push_back(err);
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats.clone()
    }

    /// Read a committed document
    pub fn document(&self, key: &str) -> Result<Option<Value>> {
        let state = self.state.lock()?;
        Ok(state.documents.get(key).cloned())
    }

    /// Number of committed documents
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionSource for MemoryStore {
    type Session = MemorySession;

    async fn start_session(&self, options: &TransactionOptions) -> Result<MemorySession> {
        let mut state = self.state.lock()?;
        state.take_fault(StoreOp::StartSession)?;
        state.stats.sessions_started += 1;

        Ok(MemorySession {
            id: Uuid::new_v4().to_string(),
            options: *options,
            store: Arc::clone(&self.state),
            txn: Mutex::new(SessionTxn::default()),
        })
    }
}

#[derive(Default)]
struct SessionTxn {
    in_transaction: bool,
    ended: bool,
    /// Key -> new value, `None` for a delete
    staged: BTreeMap<String, Option<Value>>,
}

/// Session on a `MemoryStore`
pub struct MemorySession {
    id: String,
    options: TransactionOptions,
    store: Arc<Mutex<StoreState>>,
    txn: Mutex<SessionTxn>,
}

impl MemorySession {
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Stage an insert or replacement of `key`
    pub fn insert(&self, key: &str, value: Value) -> Result<()> {
        self.stage(key, Some(value))
    }

    /// Stage a delete of `key`; returns whether the key was visible
    pub fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.get(key)?.is_some();
        self.stage(key, None)?;
        Ok(existed)
    }

    /// Read `key`, seeing this transaction's own staged writes
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let state = self.store.lock()?;
        let txn = self.txn.lock()?;
        Self::ensure_open(&txn)?;

        match txn.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(state.documents.get(key).cloned()),
        }
    }

    /// Number of writes staged in the open transaction
    pub fn staged_writes(&self) -> usize {
        self.txn
            .lock()
            .map(|txn| txn.staged.len())
            .unwrap_or_default()
    }

    fn stage(&self, key: &str, value: Option<Value>) -> Result<()> {
        let mut guard = self.store.lock()?;
        let state = &mut *guard;
        let mut txn = self.txn.lock()?;
        Self::ensure_open(&txn)?;

        if let Some(holder) = state.write_locks.get(key) {
            if holder != &self.id {
                return Err(StoreError::new(
                    "WriteConflict",
                    format!(
                        "write conflict on '{}' with session {} [{}]",
                        key, holder, TRANSIENT_TRANSACTION_ERROR
                    ),
                )
                .into());
            }
        } else {
            state.write_locks.insert(key.to_string(), self.id.clone());
        }

        txn.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn ensure_open(txn: &SessionTxn) -> Result<()> {
        if txn.ended {
            return Err(StoreError::new("SessionEnded", "session has already ended").into());
        }
        if !txn.in_transaction {
            return Err(StoreError::new("NoSuchTransaction", "no transaction in progress").into());
        }
        Ok(())
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn start_transaction(&self) -> Result<()> {
        let mut state = self.store.lock()?;
        state.take_fault(StoreOp::StartTransaction)?;

        let mut txn = self.txn.lock()?;
        if txn.ended {
            return Err(StoreError::new("SessionEnded", "session has already ended").into());
        }
        if txn.in_transaction {
            return Err(
                StoreError::new("IllegalOperation", "transaction already in progress").into(),
            );
        }

        txn.in_transaction = true;
        txn.staged.clear();
        state.stats.transactions_started += 1;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut state = self.store.lock()?;
        state.take_fault(StoreOp::Commit)?;

        let mut txn = self.txn.lock()?;
        Self::ensure_open(&txn)?;

        for (key, value) in std::mem::take(&mut txn.staged) {
            match value {
                Some(value) => {
                    state.documents.insert(key, value);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }

        txn.in_transaction = false;
        state.release_locks(&self.id);
        state.stats.commits += 1;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn
            .lock()
            .map(|txn| txn.in_transaction)
            .unwrap_or(false)
    }

    async fn abort_transaction(&self) -> Result<()> {
        let mut state = self.store.lock()?;
        state.take_fault(StoreOp::Abort)?;

        let mut txn = self.txn.lock()?;
        Self::ensure_open(&txn)?;

        txn.staged.clear();
        txn.in_transaction = false;
        state.release_locks(&self.id);
        state.stats.aborts += 1;
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        let mut state = self.store.lock()?;
        state.take_fault(StoreOp::EndSession)?;

        let mut txn = self.txn.lock()?;
        if txn.ended {
            return Ok(());
        }

        // An open transaction dies with its session
        if txn.in_transaction {
            txn.staged.clear();
            txn.in_transaction = false;
            state.release_locks(&self.id);
        }

        txn.ended = true;
        state.stats.sessions_ended += 1;
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        // A session dropped without end_session (cancelled attempt, dropped
        // manager) must not keep its keys locked.
        let txn = self.txn.get_mut().unwrap_or_else(PoisonError::into_inner);
        if txn.ended {
            return;
        }
        txn.staged.clear();
        txn.in_transaction = false;
        txn.ended = true;

        let mut state = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        state.release_locks(&self.id);
        state.stats.sessions_ended += 1;
    }
}
