use std::error::Error;
use thiserror::Error;

/// Result alias for mirror store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by a mirror backend, whichever database sits behind it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request right now.
    #[error("mirror store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The selected backend was left out of this build.
    #[error("mirror backend `{backend}` is not compiled in")]
    BackendDisabled { backend: &'static str },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether trying the same backend again later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
