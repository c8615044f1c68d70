//! Run-level error types
//!
//! Every fatal condition of an import run resolves to exactly one
//! [`ImportError`]. Recoverable failures inside a strategy never reach this
//! type; they are logged and the pipeline continues with reduced data.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Catalog credentials are missing. Set CATALOG_DATABASE_URL.")]
    MissingCatalogCredentials,

    #[error("Missing Collectr URL.")]
    MissingUrl,

    #[error("Invalid Collectr URL: {0}")]
    InvalidUrl(String),

    #[error("URL must be a {expected} link (got {actual}).")]
    WrongHost { expected: String, actual: String },

    #[error("URL must point to a Collectr profile page.")]
    MissingProfileId,

    #[error("No items found in showcase: {0}")]
    NoItemsFound(String),

    #[error("Failed to fetch showcase page: HTTP {status}")]
    StaticFetchFailed { status: u16 },

    #[error("Catalog read failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Import run was cancelled")]
    Cancelled,
}

impl ImportError {
    /// Whether the caller supplied bad input, as opposed to an internal failure
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUrl | Self::InvalidUrl(_) | Self::WrongHost { .. } | Self::MissingProfileId
        )
    }

    pub fn catalog(source: anyhow::Error) -> Self {
        Self::Catalog(source)
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

/// `Cancelled` once the run's token has fired
pub fn ensure_active(cancel: &CancellationToken) -> ImportResult<()> {
    if cancel.is_cancelled() { Err(ImportError::Cancelled) } else { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_classification() {
        assert!(ImportError::MissingProfileId.is_user_error());
        assert!(ImportError::InvalidUrl("x".into()).is_user_error());
        assert!(!ImportError::NoItemsFound("empty".into()).is_user_error());
        assert!(!ImportError::catalog(anyhow::anyhow!("boom")).is_user_error());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = ImportError::StaticFetchFailed { status: 403 };
        assert_eq!(err.to_string(), "Failed to fetch showcase page: HTTP 403");

        let err = ImportError::catalog(anyhow::anyhow!("disk I/O error"));
        assert!(err.to_string().contains("disk I/O error"));
    }
}
