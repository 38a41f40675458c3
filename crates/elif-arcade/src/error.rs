//! Error types for the ArcadeDB client
//!
//! Every fallible operation in the crate returns [`ArcadeResult`]. Migration
//! folds additionally report how far they got through [`RunError`].

use thiserror::Error;

/// Result type alias for client operations
pub type ArcadeResult<T> = Result<T, ArcadeError>;

/// Error kinds surfaced by the client, the transaction coordinator and the
/// migration runner
#[derive(Debug, Clone, Error)]
pub enum ArcadeError {
    /// The server could not be reached or the response body could not be read
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the request
    #[error("Remote error ({status}): {message}")]
    Remote {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    /// Commit was requested on a context without a session
    #[error("No active transaction")]
    NoActiveTransaction,

    /// A migration's `up` step or its bookkeeping insert failed
    #[error("Migration {version} failed: {cause}")]
    MigrationFailure {
        version: i64,
        cause: Box<ArcadeError>,
    },

    /// A migration's `down` step or its bookkeeping delete failed
    #[error("Rollback of migration {version} failed: {cause}")]
    RollbackFailure {
        version: i64,
        cause: Box<ArcadeError>,
    },

    /// The unit of work inside a transaction returned an error
    #[error("Transaction failed: {cause}")]
    TransactionFailed { cause: Box<ArcadeError> },

    /// The unit of work inside a transaction aborted or panicked
    #[error("Transaction aborted: {signal}")]
    TransactionAborted { signal: String },

    /// A migration unit panicked instead of returning an error
    #[error("{0}")]
    Panicked(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A body or row did not have the expected shape
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ArcadeError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        ArcadeError::Remote {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn migration_failure(version: i64, cause: ArcadeError) -> Self {
        ArcadeError::MigrationFailure {
            version,
            cause: Box::new(cause),
        }
    }

    pub fn rollback_failure(version: i64, cause: ArcadeError) -> Self {
        ArcadeError::RollbackFailure {
            version,
            cause: Box::new(cause),
        }
    }

    pub fn transaction_failed(cause: ArcadeError) -> Self {
        ArcadeError::TransactionFailed {
            cause: Box::new(cause),
        }
    }

    /// The innermost error, unwrapping migration and transaction wrappers
    pub fn root_cause(&self) -> &ArcadeError {
        match self {
            ArcadeError::MigrationFailure { cause, .. }
            | ArcadeError::RollbackFailure { cause, .. }
            | ArcadeError::TransactionFailed { cause } => cause.root_cause(),
            other => other,
        }
    }

    /// Version of the migration this error is attributed to, if any
    pub fn migration_version(&self) -> Option<i64> {
        match self {
            ArcadeError::MigrationFailure { version, .. }
            | ArcadeError::RollbackFailure { version, .. } => Some(*version),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ArcadeError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ArcadeError::remote(status.as_u16(), err.to_string())
        } else {
            ArcadeError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ArcadeError {
    fn from(err: serde_json::Error) -> Self {
        ArcadeError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ArcadeError {
    fn from(err: url::ParseError) -> Self {
        ArcadeError::Configuration(format!("Invalid endpoint URL: {}", err))
    }
}

/// A sequential migration fold stopped early
///
/// `completed` counts the units that were applied (or rolled back) before
/// `source` occurred. Those units stay applied; callers resume by running
/// the same operation again.
#[derive(Debug, Clone, Error)]
#[error("{source} (after {completed} completed)")]
pub struct RunError {
    pub completed: usize,
    #[source]
    pub source: ArcadeError,
}

impl RunError {
    pub fn new(completed: usize, source: ArcadeError) -> Self {
        Self { completed, source }
    }

    /// Discard the progress count
    pub fn into_inner(self) -> ArcadeError {
        self.source
    }
}

impl From<RunError> for ArcadeError {
    fn from(err: RunError) -> Self {
        err.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArcadeError::migration_failure(3, ArcadeError::remote(400, "bad syntax"));
        assert_eq!(
            err.to_string(),
            "Migration 3 failed: Remote error (400): bad syntax"
        );

        assert_eq!(
            ArcadeError::NoActiveTransaction.to_string(),
            "No active transaction"
        );
    }

    #[test]
    fn test_root_cause_unwraps_nested_errors() {
        let inner = ArcadeError::Connection("refused".to_string());
        let err = ArcadeError::transaction_failed(ArcadeError::rollback_failure(2, inner));

        assert!(matches!(err.root_cause(), ArcadeError::Connection(msg) if msg == "refused"));
        assert_eq!(err.migration_version(), None);
        assert_eq!(
            ArcadeError::rollback_failure(2, ArcadeError::NoActiveTransaction).migration_version(),
            Some(2)
        );
    }

    #[test]
    fn test_run_error_keeps_progress() {
        let err = RunError::new(2, ArcadeError::migration_failure(3, ArcadeError::remote(500, "boom")));
        assert_eq!(err.completed, 2);
        assert!(err.to_string().ends_with("(after 2 completed)"));

        let inner: ArcadeError = err.into();
        assert_eq!(inner.migration_version(), Some(3));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(ArcadeError::from(parse), ArcadeError::Serialization(_)));
    }
}
