pub mod config;

use crate::core::Result;
use async_trait::async_trait;
use config::TransactionOptions;

/// Connection capability handed to a `SessionManager`
///
/// Acquires sessions from the underlying store. A single source is usually
/// shared (behind an `Arc`) by many managers; it is never mutated by them.
/// Similar to `mongodb::Client::start_session`.
#[async_trait]
pub trait SessionSource: Send + Sync {
    type Session: StoreSession;

    /// Open a new session bound to one underlying connection
    async fn start_session(&self, options: &TransactionOptions) -> Result<Self::Session>;
}

/// One transactional session on the store
///
/// All methods take `&self`: the session is handed to the unit of work as a
/// shared handle while the manager keeps ownership of its lifecycle.
#[async_trait]
pub trait StoreSession: Send + Sync + 'static {
    /// Store-assigned session identifier, used for log correlation
    fn id(&self) -> String;

    async fn start_transaction(&self) -> Result<()>;

    async fn commit_transaction(&self) -> Result<()>;

    /// Whether the store considers a transaction open on this session
    fn in_transaction(&self) -> bool;

    async fn abort_transaction(&self) -> Result<()>;

    async fn end_session(&self) -> Result<()>;
}
