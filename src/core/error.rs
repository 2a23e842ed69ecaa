use std::fmt;
use thiserror::Error;

/// Error reported by the underlying transactional store.
///
/// Stores identify their failures by name (for example `WriteConflict` or
/// `TransientTransactionError`) and carry labels inside the message text.
/// Retry classification matches against both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub name: String,
    pub message: String,
}

impl StoreError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for StoreError {}

#[derive(Error, Debug)]
pub enum TxnError {
    #[error("A session is already active on this manager")]
    AlreadyActive,

    #[error("No active session; call begin() first")]
    NoActiveSession,

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl TxnError {
    /// Identifier used for retry classification.
    pub fn name(&self) -> &str {
        match self {
            TxnError::AlreadyActive => "AlreadyActiveError",
            TxnError::NoActiveSession => "NoActiveSessionError",
            TxnError::Store(err) => &err.name,
            TxnError::Execution(_) => "ExecutionError",
            TxnError::Config(_) => "ConfigError",
            TxnError::Lock(_) => "LockError",
        }
    }

    /// Message text without the identifier prefix.
    pub fn message(&self) -> String {
        match self {
            TxnError::Store(err) => err.message.clone(),
            TxnError::Execution(msg) | TxnError::Config(msg) | TxnError::Lock(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Shorthand for a store error with the given name and message.
    pub fn store(name: impl Into<String>, message: impl Into<String>) -> Self {
        TxnError::Store(StoreError::new(name, message))
    }

    pub fn is_usage_error(&self) -> bool {
        matches!(self, TxnError::AlreadyActive | TxnError::NoActiveSession)
    }
}

impl From<StoreError> for TxnError {
    fn from(err: StoreError) -> Self {
        TxnError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, TxnError>;

impl<T> From<std::sync::PoisonError<T>> for TxnError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
