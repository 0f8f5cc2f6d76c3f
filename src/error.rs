//! Crate-wide error taxonomy.
//!
//! Every public entry point returns [`Result<T>`] rather than a bare
//! untyped failure; callers match on [`Error`] to tell a retriable
//! network hiccup from a terminal security problem.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error (status {status_code:?}): {message}")]
    Network {
        status_code: Option<u16>,
        message: String,
        error_data: Option<serde_json::Value>,
    },

    #[error("malformed provider response: {0}")]
    Schema(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invoice expired")]
    InvoiceExpired,

    #[error("swap expired")]
    SwapExpired,

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("transaction refunded")]
    TransactionRefunded,

    #[error("security error: {0}")]
    Security(String),

    #[error("polling timed out after {attempts} attempts")]
    PollingTimeout { attempts: u32 },

    #[error("swap {0} not found")]
    SwapNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn network(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Error::Network {
            status_code,
            message: message.into(),
            error_data: None,
        }
    }

    pub fn network_with_body(
        status_code: Option<u16>,
        message: impl Into<String>,
        error_data: serde_json::Value,
    ) -> Self {
        Error::Network {
            status_code,
            message: message.into(),
            error_data: Some(error_data),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    /// Security errors must never be retried by the caller.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Security(_)
                | Error::Schema(_)
                | Error::InvoiceExpired
                | Error::SwapExpired
                | Error::TransactionRefunded
        )
    }
}

/// Extension trait mirroring `ark-core`'s `ErrorContext`: attach context to a
/// lower-level error without discarding its source.
pub trait ErrorContext<T> {
    fn context_msg(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_msg(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Internal(anyhow::Error::new(e).context(msg.into())))
    }
}
