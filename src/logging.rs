// ============================================================================
// Logger Sink
// ============================================================================
//
// The manager and executor report lifecycle events through an injected
// `TxnLogger`. Logging is fire-and-forget and never influences control flow.
//
// ============================================================================

use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;

pub const LOG_TARGET: &str = "sessiontx";

/// Pluggable logger with four severity levels
pub trait TxnLogger: Send + Sync {
    fn debug(&self, message: &str, detail: Option<&Value>);
    fn info(&self, message: &str, detail: Option<&Value>);
    fn warn(&self, message: &str, detail: Option<&Value>);
    fn error(&self, message: &str, detail: Option<&Value>);
}

/// Default logger forwarding to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    fn render(message: &str, detail: Option<&Value>) -> String {
        match detail {
            Some(detail) => format!("{} {}", message, detail),
            None => message.to_string(),
        }
    }
}

impl TxnLogger for LogSink {
    fn debug(&self, message: &str, detail: Option<&Value>) {
        debug!(target: LOG_TARGET, "{}", Self::render(message, detail));
    }

    fn info(&self, message: &str, detail: Option<&Value>) {
        info!(target: LOG_TARGET, "{}", Self::render(message, detail));
    }

    fn warn(&self, message: &str, detail: Option<&Value>) {
        warn!(target: LOG_TARGET, "{}", Self::render(message, detail));
    }

    fn error(&self, message: &str, detail: Option<&Value>) {
        error!(target: LOG_TARGET, "{}", Self::render(message, detail));
    }
}

/// Logger that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl TxnLogger for NoopLogger {
    fn debug(&self, _message: &str, _detail: Option<&Value>) {}
    fn info(&self, _message: &str, _detail: Option<&Value>) {}
    fn warn(&self, _message: &str, _detail: Option<&Value>) {}
    fn error(&self, _message: &str, _detail: Option<&Value>) {}
}

pub(crate) fn default_logger() -> Arc<dyn TxnLogger> {
    Arc::new(LogSink)
}
