//! Domain Error Kinds
//!
//! Shared error enum for the failure categories the bot distinguishes.
//! Adapters wrap these in `anyhow::Error` with context; callers that
//! need to branch on a kind use `downcast_ref::<BotError>()`.

use thiserror::Error;

/// Failure categories surfaced across component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    /// Requested entity does not exist (market, snapshot, strategy).
    #[error("not found: {0}")]
    NotFound(String),
    /// Entity already exists (duplicate registration, duplicate record).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A throttle rejected the operation.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Caller lacks permission or a kill switch is engaged.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Order failed venue-side validation.
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    /// Payload could not be signed for submission.
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// Market data connection dropped.
    #[error("feed disconnected: {0}")]
    FeedDisconnected(String),
    /// The operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,
    /// A named lock is held by another owner.
    #[error("lock held: {0}")]
    LockHeld(String),
}
