use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by a user store, whatever database sits behind it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure, keeping it as the error source.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
impl StorageError {
    /// Stand-in outage used by tests exercising the failure paths.
    pub(crate) fn simulated(operation: &str) -> Self {
        StorageError::unavailable(
            format!("simulated outage during {operation}"),
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline"),
        )
    }
}
