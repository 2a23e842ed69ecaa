use crate::core::{Result, TxnError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";
pub const UNKNOWN_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

/// Decides whether a failed attempt is worth another try and how long to wait.
pub trait RetryPolicy: Send + Sync {
    /// Highest attempt index; attempts run from 0 to this value inclusive.
    fn retry_limit(&self) -> u32;

    fn is_retryable(&self, err: &TxnError) -> bool;

    /// Delay before the retry that follows a failed attempt `attempt`.
    fn delay_for(&self, attempt: u32) -> Duration;
}

/// Retry configuration with exponential backoff
///
/// Missing fields in a partial JSON document fall back to the defaults:
/// 3 retries, 100ms initial delay doubling up to 1000ms, retrying
/// `TransientTransactionError` and `UnknownTransactionCommitResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryOptions {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_factor: 2.0,
            retryable_errors: vec![
                TRANSIENT_TRANSACTION_ERROR.to_string(),
                UNKNOWN_COMMIT_RESULT.to_string(),
            ],
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that never retry: the first failure is terminal.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            retryable_errors: Vec::new(),
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Replace the set of retryable error identifiers
    pub fn retryable_errors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a (possibly partial) JSON document merged over the defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| TxnError::Config(format!("invalid retry options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(TxnError::Config("backoff_factor must be >= 1".into()));
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err(TxnError::Config(
                "initial_delay_ms cannot exceed max_delay_ms".into(),
            ));
        }

        if self.retryable_errors.iter().any(|name| name.is_empty()) {
            return Err(TxnError::Config(
                "retryable error identifiers cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

impl RetryPolicy for RetryOptions {
    fn retry_limit(&self) -> u32 {
        self.max_retries
    }

    /// Exact match on the error name, or substring match in its message.
    fn is_retryable(&self, err: &TxnError) -> bool {
        let name = err.name();
        let message = err.message();
        self.retryable_errors
            .iter()
            .any(|id| name == id || message.contains(id.as_str()))
    }

    /// `min(initial * factor^attempt, max)`, without jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RetryOptions::default();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.initial_delay_ms, 100);
        assert_eq!(options.max_delay_ms, 1000);
        assert_eq!(options.backoff_factor, 2.0);
        assert_eq!(
            options.retryable_errors,
            vec!["TransientTransactionError", "UnknownTransactionCommitResult"]
        );
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let options = RetryOptions::default();
        let delays: Vec<u64> = (0..7)
            .map(|n| options.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000, 1000]);
    }

    #[test]
    fn test_backoff_huge_attempt_saturates_at_cap() {
        let options = RetryOptions::default();
        assert_eq!(options.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_classification_by_name() {
        let options = RetryOptions::default();
        let err = TxnError::store("TransientTransactionError", "write conflict");
        assert!(options.is_retryable(&err));
    }

    #[test]
    fn test_classification_by_message_substring() {
        let options = RetryOptions::default();
        let err = TxnError::store(
            "WriteConflict",
            "commit failed [UnknownTransactionCommitResult]",
        );
        assert!(options.is_retryable(&err));
    }

    #[test]
    fn test_name_must_match_exactly() {
        let options = RetryOptions::default();
        let err = TxnError::store("TransientTransactionErrorX", "boom");
        assert!(!options.is_retryable(&err));
    }

    #[test]
    fn test_usage_errors_are_not_retryable() {
        let options = RetryOptions::default();
        assert!(!options.is_retryable(&TxnError::AlreadyActive));
        assert!(!options.is_retryable(&TxnError::NoActiveSession));
    }

    #[test]
    fn test_empty_set_never_retries() {
        let options = RetryOptions::default().retryable_errors(Vec::<String>::new());
        let err = TxnError::store("TransientTransactionError", "TransientTransactionError");
        assert!(!options.is_retryable(&err));
        assert!(!RetryOptions::no_retry().is_retryable(&err));
    }

    #[test]
    fn test_partial_json_merges_over_defaults() {
        let options =
            RetryOptions::from_json(r#"{"maxRetries": 5, "initialDelayMs": 10}"#).unwrap();
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.initial_delay_ms, 10);
        assert_eq!(options.max_delay_ms, 1000);
        assert_eq!(options.retryable_errors.len(), 2);
    }

    #[test]
    fn test_validate() {
        assert!(RetryOptions::default().validate().is_ok());
        assert!(RetryOptions::default().backoff_factor(0.5).validate().is_err());
        assert!(RetryOptions::default().backoff_factor(f64::NAN).validate().is_err());
        assert!(
            RetryOptions::default()
                .initial_delay(Duration::from_secs(5))
                .validate()
                .is_err()
        );
        assert!(
            RetryOptions::default()
                .retryable_errors([""])
                .validate()
                .is_err()
        );
        assert!(RetryOptions::from_json(r#"{"backoffFactor": 0}"#).is_err());
    }
}
