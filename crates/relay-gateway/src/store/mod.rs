//! The persistence layer: users and message envelopes, with undelivered-flag
//! accounting.

mod rocks;

pub use rocks::RocksStore;

use async_trait::async_trait;
use relay_types::{Envelope, MessageId, User, Username};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record encoding error: {0}")]
    Encoding(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for users and message envelopes.
///
/// Implementations must uphold the transactional contract on
/// [`Store::get_undelivered_for_recipient`] followed by per-id
/// [`Store::mark_delivered`]: a concurrent second drain for the same
/// recipient must not observe overlapping envelopes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a new user. Returns `Ok(true)` if a user with this username
    /// already existed (idempotent re-registration with the same key),
    /// `Ok(false)` if this is a new user, or `StoreError::AlreadyExists` if
    /// the username is already bound to a *different* public key.
    async fn insert_user(&self, username: &Username, public_key_pem: &str) -> StoreResult<bool>;

    async fn get_user(&self, username: &Username) -> StoreResult<Option<User>>;

    /// Assigns an id and `sent_at`, persists the envelope with `delivered_at`
    /// unset. Never checks recipient existence.
    async fn insert_message(&self, envelope: Envelope) -> StoreResult<Envelope>;

    /// All envelopes addressed to `username` with `delivered_at` still null,
    /// ordered by `sent_at` ascending.
    async fn get_undelivered_for_recipient(&self, username: &Username) -> StoreResult<Vec<Envelope>>;

    /// Sets `delivered_at = now()` if currently null; no-op otherwise.
    async fn mark_delivered(&self, id: MessageId) -> StoreResult<()>;

    /// Atomically drains all undelivered envelopes for `username`: fetches
    /// them and marks every returned id delivered before another caller can
    /// observe the same envelopes. Equivalent to
    /// `get_undelivered_for_recipient` followed by `mark_delivered` per id,
    /// but serialized against concurrent drains for the same recipient.
    async fn drain_undelivered(&self, username: &Username) -> StoreResult<Vec<Envelope>>;
}
