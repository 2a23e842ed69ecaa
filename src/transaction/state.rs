// ============================================================================
// Session Transaction State
// ============================================================================
//
// Tracks where the active session's transaction is in its lifecycle, as seen
// by the manager that owns it:
//
// ```text
// None ──begin──> Active ──commit──> Committed
//                   │
//                   └──abort──> Aborted
// ```
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    /// Session exists but no transaction has been started on it
    None,

    /// Transaction is open and accepts operations
    Active,

    /// Transaction has been committed
    Committed,

    /// Transaction has been aborted (or an abort was attempted)
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::None => write!(f, "NONE"),
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Snapshot of the manager's active session slot
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: TransactionState,
    pub started_at: DateTime<Utc>,
}

/// The exclusively owned session slot inside a manager
pub(crate) struct ActiveSession<T> {
    pub(crate) handle: std::sync::Arc<T>,
    pub(crate) state: TransactionState,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) opened: Instant,
}

impl<T> ActiveSession<T> {
    pub(crate) fn new(handle: std::sync::Arc<T>) -> Self {
        Self {
            handle,
            state: TransactionState::None,
            started_at: Utc::now(),
            opened: Instant::now(),
        }
    }

    /// Elapsed time since the session was acquired, in milliseconds
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.opened.elapsed().as_millis() as u64
    }
}
