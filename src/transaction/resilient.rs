use super::manager::{ManagerOptions, SessionManager, TxFuture};
use super::retry::{RetryOptions, RetryPolicy};
use crate::connection::SessionSource;
use crate::core::Result;
use serde_json::json;
use std::sync::Arc;

/// Transaction executor that retries transient failures
///
/// Wraps one `SessionManager` and re-runs the full lifecycle (begin, execute,
/// commit or abort, dispose) whenever an attempt fails with an error the
/// retry policy classifies as retryable. Every other operation is delegated
/// to the wrapped manager unchanged.
///
/// # Examples
///
/// ```
/// use sessiontx::{MemoryStore, ManagerOptions, ResilientExecutor, RetryOptions, TxnError};
/// use serde_json::json;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(MemoryStore::new());
/// let options = ManagerOptions::new()
///     .retry_options(RetryOptions::new().initial_delay(Duration::from_millis(5)));
/// let mut executor = ResilientExecutor::with_options(store.clone(), options);
///
/// executor
///     .execute_transaction(|session, _manager| {
///         Box::pin(async move {
///             session.insert("orders/1", json!({"status": "paid"}))?;
///             Ok::<_, TxnError>(())
///         })
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(store.stats().commits, 1);
/// # });
/// ```
pub struct ResilientExecutor<S: SessionSource, P: RetryPolicy = RetryOptions> {
    manager: SessionManager<S>,
    policy: P,
}

impl<S: SessionSource> ResilientExecutor<S, RetryOptions> {
    /// Create an executor with default transaction and retry options
    pub fn new(source: Arc<S>) -> Self {
        Self::with_options(source, ManagerOptions::default())
    }

    /// Create an executor; `retry_options` becomes the retry policy
    ///
    /// The options are taken as given; use `try_with_options` to validate them.
    pub fn with_options(source: Arc<S>, options: ManagerOptions) -> Self {
        let policy = options.retry_options.clone();
        Self {
            manager: SessionManager::with_options(source, options),
            policy,
        }
    }

    /// Create an executor after validating both transaction and retry options
    pub fn try_with_options(source: Arc<S>, options: ManagerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::with_options(source, options))
    }
}

impl<S: SessionSource, P: RetryPolicy> ResilientExecutor<S, P> {
    /// Wrap an existing manager with a custom retry policy
    pub fn with_policy(manager: SessionManager<S>, policy: P) -> Self {
        Self { manager, policy }
    }

    pub fn manager(&self) -> &SessionManager<S> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SessionManager<S> {
        &mut self.manager
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn into_inner(self) -> SessionManager<S> {
        self.manager
    }

    pub async fn begin(&mut self) -> Result<&mut Self> {
        self.manager.begin().await?;
        Ok(self)
    }

    pub fn get_session(&self) -> Result<Arc<S::Session>> {
        self.manager.get_session()
    }

    pub async fn execute<F, T>(&self, unit: F) -> Result<T>
    where
        F: for<'a> FnOnce(Arc<S::Session>, &'a SessionManager<S>) -> TxFuture<'a, T>,
    {
        self.manager.execute(unit).await
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.manager.commit().await
    }

    pub async fn abort(&mut self) {
        self.manager.abort().await
    }

    pub async fn dispose(&mut self) {
        self.manager.dispose().await
    }

    /// Run a unit of work, retrying the whole lifecycle on transient failure
    ///
    /// Attempts are numbered `0..=retry_limit`. Each attempt begins a fresh
    /// session and disposes it before the next one starts. A non-retryable
    /// error, or any error on the last attempt, is returned as is; the
    /// caller always sees the original error of the final attempt.
    pub async fn execute_transaction<F, T>(&mut self, mut operation: F) -> Result<T>
    where
        F: for<'a> FnMut(Arc<S::Session>, &'a SessionManager<S>) -> TxFuture<'a, T>,
    {
        let limit = self.policy.retry_limit();
        let mut attempt: u32 = 0;

        loop {
            let result = self
                .manager
                .execute_transaction(|session, manager| operation(session, manager))
                .await;

            let err = match result {
                Ok(value) => {
                    if attempt > 0 {
                        self.manager.logger().info(
                            "Transaction succeeded after retry",
                            Some(&json!({ "attempt": attempt })),
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.is_usage_error() {
                self.manager.logger().warn(
                    "Transaction rejected by the session manager",
                    Some(&json!({ "attempt": attempt, "error": err.name() })),
                );
                return Err(err);
            }

            if !self.policy.is_retryable(&err) {
                self.manager.logger().debug(
                    "Transaction failed with non-retryable error",
                    Some(&json!({ "attempt": attempt, "error": err.name() })),
                );
                return Err(err);
            }

            if attempt >= limit {
                self.manager.logger().error(
                    "Transaction retries exhausted",
                    Some(&json!({
                        "attempts": attempt + 1,
                        "error": err.name(),
                        "message": err.to_string(),
                    })),
                );
                return Err(err);
            }

            let delay = self.policy.delay_for(attempt);
            self.manager.logger().warn(
                "Transaction attempt failed, retrying",
                Some(&json!({
                    "attempt": attempt,
                    "max_retries": limit,
                    "error": err.name(),
                    "backoff_ms": delay.as_millis() as u64,
                })),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
