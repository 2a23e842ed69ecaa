// ============================================================================
// Transaction Lifecycle Module
// ============================================================================
//
// Drives one transactional session through begin -> execute -> commit/abort
// -> dispose, and layers bounded exponential-backoff retries on top.
//
// Design Patterns Used:
// - State Pattern: per-session transaction state (None, Active, Committed, Aborted)
// - Decorator: `ResilientExecutor` wraps a `SessionManager` by composition
// - Strategy: `RetryPolicy` decides what to retry and how long to wait
//
// ============================================================================

pub mod manager;
pub mod resilient;
pub mod retry;
pub mod state;

pub use manager::{ManagerOptions, SessionManager, TxFuture};
pub use resilient::ResilientExecutor;
pub use retry::{RetryOptions, RetryPolicy};
pub use state::{SessionInfo, TransactionState};
