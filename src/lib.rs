// ============================================================================
// sessiontx Library
// ============================================================================
//
// Transactional execution wrapper around a session-oriented, multi-document
// store: a unit of work either fully commits or is fully aborted, and the
// session is always released. `ResilientExecutor` adds retries with
// exponential backoff for store-defined transient errors.
//
// ============================================================================

pub mod core;
pub mod connection;
pub mod logging;
pub mod store;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{Result, StoreError, TxnError};

pub use connection::{
    SessionSource, StoreSession,
    config::{Acknowledgment, ReadConcern, ReadPreference, TransactionOptions, WriteConcern},
};

pub use logging::{LogSink, NoopLogger, TxnLogger};

pub use store::{MemorySession, MemoryStore, StoreOp, StoreStats};

pub use transaction::{
    ManagerOptions, ResilientExecutor, RetryOptions, RetryPolicy, SessionInfo, SessionManager,
    TransactionState, TxFuture,
};
