//! Error types for the cache-and-sync core.

use thiserror::Error;

use crate::remote::RemoteError;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error("cache store failure: {0}")]
  Store(#[from] rusqlite::Error),

  #[error("failed to (de)serialize cached payload: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("cache store I/O failure: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not determine a data directory for the cache database")]
  NoDataDir,

  #[error("unknown entity collection {0:?} in cache store")]
  UnknownKind(String),

  #[error("cache store lock poisoned: {0}")]
  LockPoisoned(String),

  #[error("{kind} payload has no usable id")]
  MissingId { kind: &'static str },

  #[error("invalid stored timestamp {0}")]
  InvalidTimestamp(i64),

  #[error("cache duration of {seconds}s puts the expiry out of range")]
  ExpiryOutOfRange { seconds: i64 },
}

impl Error {
  /// Store-side failures abort the whole sync cycle; remote ones may be isolated.
  pub fn is_store_failure(&self) -> bool {
    matches!(
      self,
      Self::Store(_)
        | Self::Serialization(_)
        | Self::Io(_)
        | Self::NoDataDir
        | Self::UnknownKind(_)
        | Self::LockPoisoned(_)
        | Self::InvalidTimestamp(_)
        | Self::ExpiryOutOfRange { .. }
    )
  }

  /// Returns the remote failure, if this error came from the remote service.
  pub fn as_remote(&self) -> Option<&RemoteError> {
    match self {
      Self::Remote(e) => Some(e),
      _ => None,
    }
  }
}
