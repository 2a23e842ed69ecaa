use super::retry::RetryOptions;
use super::state::{ActiveSession, SessionInfo, TransactionState};
use crate::connection::config::TransactionOptions;
use crate::connection::{SessionSource, StoreSession};
use crate::core::{Result, TxnError};
use crate::logging::{TxnLogger, default_logger};
use futures::FutureExt;
use serde_json::json;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a unit of work.
pub type TxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Construction options shared by `SessionManager` and `ResilientExecutor`
///
/// Every field starts from its documented default; override only what you need.
#[derive(Clone)]
pub struct ManagerOptions {
    pub transaction_options: TransactionOptions,
    pub retry_options: RetryOptions,
    pub logger: Arc<dyn TxnLogger>,
}

impl ManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    pub fn retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn TxnLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Validate the transaction and retry options
    pub fn validate(&self) -> Result<()> {
        self.transaction_options.validate()?;
        self.retry_options.validate()
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            transaction_options: TransactionOptions::default(),
            retry_options: RetryOptions::default(),
            logger: default_logger(),
        }
    }
}

/// Session lifecycle manager
///
/// Owns at most one transactional session at a time and drives it through
/// begin, execute, commit or abort, and dispose. One manager serves one
/// logical unit of work; the `SessionSource` behind it may be shared by
/// many managers.
///
/// # Examples
///
/// ```
/// use sessiontx::{MemoryStore, SessionManager, TxnError};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(MemoryStore::new());
/// let mut manager = SessionManager::new(store.clone());
///
/// let balance = manager
///     .execute_transaction(|session, _manager| {
///         Box::pin(async move {
///             session.insert("accounts/alice", json!({"balance": 90}))?;
///             session.insert("accounts/bob", json!({"balance": 110}))?;
///             Ok::<_, TxnError>(90)
///         })
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(balance, 90);
/// assert_eq!(store.document("accounts/bob").unwrap(), Some(json!({"balance": 110})));
/// # });
/// ```
pub struct SessionManager<S: SessionSource> {
    source: Arc<S>,
    options: TransactionOptions,
    logger: Arc<dyn TxnLogger>,
    active: Option<ActiveSession<S::Session>>,
}

impl<S: SessionSource> SessionManager<S> {
    /// Create a manager with default transaction options and logger
    pub fn new(source: Arc<S>) -> Self {
        Self::with_options(source, ManagerOptions::default())
    }

    /// Create a manager with explicit options
    ///
    /// `retry_options` is ignored here; it only matters to `ResilientExecutor`.
    /// The options are taken as given; use `try_with_options` to validate them.
    pub fn with_options(source: Arc<S>, options: ManagerOptions) -> Self {
        Self {
            source,
            options: options.transaction_options,
            logger: options.logger,
            active: None,
        }
    }

    /// Create a manager after validating the transaction options
    pub fn try_with_options(source: Arc<S>, options: ManagerOptions) -> Result<Self> {
        options.transaction_options.validate()?;
        Ok(Self::with_options(source, options))
    }

    pub fn transaction_options(&self) -> &TransactionOptions {
        &self.options
    }

    pub fn logger(&self) -> &Arc<dyn TxnLogger> {
        &self.logger
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Check if a session is currently held by this manager
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Transaction state of the active session, if any
    pub fn transaction_state(&self) -> Option<TransactionState> {
        self.active.as_ref().map(|active| active.state)
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.active.as_ref().map(|active| SessionInfo {
            session_id: active.handle.id(),
            state: active.state,
            started_at: active.started_at,
        })
    }

    /// Acquire a session and start a transaction on it
    ///
    /// Fails with `TxnError::AlreadyActive` if a session is already held; the
    /// existing session is left untouched. If the transaction cannot be
    /// started, the freshly acquired session is ended before returning.
    pub async fn begin(&mut self) -> Result<&mut Self> {
        if let Some(active) = &self.active {
            self.logger.warn(
                "begin() rejected: session already active",
                Some(&json!({ "session": active.handle.id(), "state": active.state })),
            );
            return Err(TxnError::AlreadyActive);
        }

        let session = match self.source.start_session(&self.options).await {
            Ok(session) => Arc::new(session),
            Err(err) => {
                self.logger.error(
                    "Failed to start session",
                    Some(&json!({ "error": err.to_string() })),
                );
                return Err(err);
            }
        };

        if let Err(err) = session.start_transaction().await {
            self.logger.error(
                "Failed to start transaction",
                Some(&json!({ "session": session.id(), "error": err.to_string() })),
            );
            if let Err(end_err) = session.end_session().await {
                self.logger.warn(
                    "Failed to end session after start failure",
                    Some(&json!({ "session": session.id(), "error": end_err.to_string() })),
                );
            }
            return Err(err);
        }

        self.logger.debug(
            "Transaction started",
            Some(&json!({ "session": session.id(), "options": self.options.to_string() })),
        );

        let mut slot = ActiveSession::new(session);
        slot.state = TransactionState::Active;
        self.active = Some(slot);

        Ok(self)
    }

    /// Get a handle to the active session
    pub fn get_session(&self) -> Result<Arc<S::Session>> {
        self.active
            .as_ref()
            .map(|active| Arc::clone(&active.handle))
            .ok_or(TxnError::NoActiveSession)
    }

    /// Run a unit of work against the active session
    ///
    /// Neither commits nor aborts; failures of the unit are logged and
    /// returned unchanged.
    pub async fn execute<F, T>(&self, unit: F) -> Result<T>
    where
        F: for<'a> FnOnce(Arc<S::Session>, &'a Self) -> TxFuture<'a, T>,
    {
        let session = self.get_session()?;
        let session_id = session.id();

        match unit(session, self).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.logger.error(
                    "Unit of work failed",
                    Some(&json!({
                        "session": session_id,
                        "error": err.name(),
                        "message": err.to_string(),
                    })),
                );
                Err(err)
            }
        }
    }

    /// Commit the active transaction
    ///
    /// A no-op when no session is held or its transaction is not active.
    /// If the store rejects the commit, the transaction is aborted before the
    /// commit error is returned.
    pub async fn commit(&mut self) -> Result<()> {
        let Some(active) = self.active.as_ref() else {
            self.logger.debug("commit() skipped: no active session", None);
            return Ok(());
        };

        if !active.state.is_active() || !active.handle.in_transaction() {
            self.logger.debug(
                "commit() skipped: transaction not active",
                Some(&json!({ "session": active.handle.id(), "state": active.state })),
            );
            return Ok(());
        }

        let handle = Arc::clone(&active.handle);
        let elapsed_ms = active.elapsed_ms();

        match handle.commit_transaction().await {
            Ok(()) => {
                if let Some(active) = self.active.as_mut() {
                    active.state = TransactionState::Committed;
                }
                self.logger.info(
                    "Transaction committed",
                    Some(&json!({ "session": handle.id(), "elapsed_ms": elapsed_ms })),
                );
                Ok(())
            }
            Err(err) => {
                self.logger.error(
                    "Commit failed, aborting transaction",
                    Some(&json!({
                        "session": handle.id(),
                        "error": err.name(),
                        "message": err.to_string(),
                    })),
                );
                self.abort().await;
                Err(err)
            }
        }
    }

    /// Abort the active transaction
    ///
    /// A no-op when no session is held or its transaction is not active.
    /// The store is asked to abort at most once per transaction. Failures of
    /// the abort itself are logged and swallowed so they never mask the error
    /// that triggered the abort.
    pub async fn abort(&mut self) {
        let Some(active) = self.active.as_mut() else {
            self.logger.debug("abort() skipped: no active session", None);
            return;
        };

        if !active.state.is_active() || !active.handle.in_transaction() {
            let detail = json!({ "session": active.handle.id(), "state": active.state });
            self.logger.debug("abort() skipped: transaction not active", Some(&detail));
            return;
        }

        active.state = TransactionState::Aborted;
        let handle = Arc::clone(&active.handle);

        match handle.abort_transaction().await {
            Ok(()) => {
                self.logger
                    .info("Transaction aborted", Some(&json!({ "session": handle.id() })));
            }
            Err(err) => {
                self.logger.error(
                    "Abort failed; keeping the original error",
                    Some(&json!({
                        "session": handle.id(),
                        "error": err.name(),
                        "message": err.to_string(),
                    })),
                );
            }
        }
    }

    /// End the active session and clear the slot
    ///
    /// Idempotent: a no-op when no session is held. The slot is cleared even
    /// if the store fails to end the session.
    pub async fn dispose(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        let session_id = active.handle.id();
        if !active.state.is_terminal() {
            self.logger.warn(
                "Disposing session with an unfinished transaction",
                Some(&json!({ "session": session_id, "state": active.state })),
            );
        }

        match active.handle.end_session().await {
            Ok(()) => self.logger.debug(
                "Session ended",
                Some(&json!({
                    "session": session_id,
                    "state": active.state,
                    "elapsed_ms": active.elapsed_ms(),
                })),
            ),
            Err(err) => self.logger.warn(
                "Failed to end session",
                Some(&json!({ "session": session_id, "error": err.to_string() })),
            ),
        }
    }

    /// Run a unit of work inside a full transaction lifecycle
    ///
    /// begin, execute, commit; abort on any failure; dispose on every exit
    /// path, including a panicking unit of work (the panic resumes after
    /// cleanup). Returns the unit's value or the error that ended the
    /// attempt. A session begun outside this call is never touched: the call
    /// fails with `TxnError::AlreadyActive` instead.
    pub async fn execute_transaction<F, T>(&mut self, unit: F) -> Result<T>
    where
        F: for<'a> FnOnce(Arc<S::Session>, &'a Self) -> TxFuture<'a, T>,
    {
        // begin() releases anything it acquired before failing
        self.begin().await?;

        let outcome = AssertUnwindSafe(self.execute(unit)).catch_unwind().await;

        let result = match outcome {
            Ok(Ok(value)) => self.commit().await.map(|()| value),
            Ok(Err(err)) => Err(err),
            Err(panic) => {
                self.logger.error("Unit of work panicked, aborting transaction", None);
                self.abort().await;
                self.dispose().await;
                std::panic::resume_unwind(panic);
            }
        };

        if result.is_err() {
            self.abort().await;
        }
        self.dispose().await;

        result
    }
}

impl<S: SessionSource> Drop for SessionManager<S> {
    fn drop(&mut self) {
        // Async cleanup is not possible in Drop; the store reclaims the session.
        if let Some(active) = &self.active {
            self.logger.warn(
                "SessionManager dropped with an active session; call dispose().await",
                Some(&json!({ "session": active.handle.id(), "state": active.state })),
            );
        }
    }
}
