//! Typed failures for the engine and its storage layers.
//!
//! Validation and lookup failures (`RecordNotFound`, `InvalidInput`) are
//! client errors and leave no state behind. `GatewayCallFailed` aborts the
//! current refresh cycle; merges already committed earlier in the same cycle
//! stay committed. `InvariantViolation` means a logic bug was caught before
//! persisting.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// A gateway invocation exited non-zero or produced unusable output.
  #[error("gateway call failed ({context}): {message}")]
  GatewayCallFailed { context: String, message: String },

  #[error("no pull request stored under {url}")]
  RecordNotFound { url: String },

  /// The record set failed validation after a merge or mutation. The
  /// enclosing transaction is abandoned instead of persisting.
  #[error("record set invariant violated: {0}")]
  InvariantViolation(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("unparseable GitHub timestamp: {0}")]
  BadTimestamp(String),

  #[error("lock poisoned: {0}")]
  LockPoisoned(String),

  #[error("storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("serialization error: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}
