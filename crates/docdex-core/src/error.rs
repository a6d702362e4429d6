//! Error types and handling for docdex-core operations.
//!
//! This module provides a comprehensive error type that covers all possible failures
//! in the docdex indexing and retrieval system. Errors are categorized for easier
//! handling and include context about recoverability for retry logic.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: File system operations, disk access
//! - **Network Errors**: HTTP requests, connectivity issues
//! - **Parse Errors**: HTML/Markdown/JSON parsing, tree-sitter failures
//! - **Storage Errors**: Database operations, constraint violations
//! - **Embedding Errors**: Provider failures after internal retry
//! - **Configuration Errors**: Invalid settings or config files
//!
//! ## Recovery Hints
//!
//! Errors include information about whether they might be recoverable through
//! retries via [`Error::is_recoverable`]. Cancellation and redirect errors are
//! always terminal for the operation that raised them.

use thiserror::Error;

/// The main error type for docdex-core operations.
///
/// All public functions in docdex-core return `Result<T, Error>` for consistent
/// error handling. The error type includes automatic conversion from common
/// standard library errors and provides additional metadata for error handling
/// logic.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers file system operations like reading documentation files, creating
    /// the data directory, and checking file metadata. The underlying
    /// `std::io::Error` is preserved to maintain detailed error information.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Covers HTTP requests for fetching pages and embedding calls. The
    /// underlying `reqwest::Error` is preserved for detailed connection
    /// information.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A redirect was encountered while redirect following was disabled.
    ///
    /// Carries the original URL, the redirect target from the `Location`
    /// header, and the 3xx status code. Never retried.
    #[error("Redirect ({status}) from '{url}' to '{location}'")]
    Redirect {
        /// URL that produced the redirect response.
        url: String,
        /// Redirect target from the `Location` header.
        location: String,
        /// The 3xx status code.
        status: u16,
    },

    /// The operation was cancelled via its cancellation token.
    ///
    /// Terminal for the job that raised it; the job transitions to
    /// `cancelled` and is never retried.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Parsing operation failed.
    ///
    /// Occurs when HTML, Markdown, or JSON content cannot be parsed, or when
    /// tree-sitter fails on a source file. Parse errors are recorded on the
    /// scrape result and the pipeline falls back to text splitting, so they
    /// rarely abort a job.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Storage operation failed.
    ///
    /// Covers database constraint violations, transaction failures, and
    /// unexpected row shapes. Whether a storage error is fatal depends on the
    /// call site: chunk-insert failures are reported per page and the job
    /// continues; page-delete failures during refresh abort the job.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A schema migration failed while opening the store.
    ///
    /// Fatal at startup. The database is left at its previous schema version.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Embedding provider failed after internal retry.
    ///
    /// Provider 4xx/5xx responses that survive the retry policy surface as
    /// this variant and are fatal to the page insert that required them.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration is invalid or inaccessible.
    ///
    /// Fatal at startup: missing embedding model in local mode, malformed
    /// config file, invalid option combinations.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource was not found.
    ///
    /// Used for missing libraries/versions in the store and for lookups that
    /// reference deleted rows.
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    ///
    /// Typically recoverable with retry logic.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    ///
    /// Occurs when converting scraper options or chunk metadata between JSON
    /// and their typed forms.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for errors that are typically temporary and might
    /// succeed if the operation is retried after a delay: network timeouts,
    /// connection failures, and temporary I/O issues. Cancellation,
    /// redirects, parse failures, and configuration problems are permanent.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    ///
    /// Returns a static string that categorizes the error type for logging
    /// and error handling logic.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Redirect { .. } => "redirect",
            Self::Cancelled(_) => "cancelled",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Migration(_) => "migration",
            Self::Embedding(_) => "embedding",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }

    /// Returns `true` if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
///
/// This type is used throughout docdex-core for consistent error handling.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_categories() {
        let error_categories = vec![
            (Error::Io(io::Error::other("test")), "io"),
            (Error::Parse("test".to_string()), "parse"),
            (Error::Storage("test".to_string()), "storage"),
            (Error::Migration("test".to_string()), "migration"),
            (Error::Embedding("test".to_string()), "embedding"),
            (Error::Config("test".to_string()), "config"),
            (Error::NotFound("test".to_string()), "not_found"),
            (Error::InvalidUrl("test".to_string()), "invalid_url"),
            (Error::Timeout("test".to_string()), "timeout"),
            (Error::Serialization("test".to_string()), "serialization"),
            (Error::Cancelled("test".to_string()), "cancelled"),
            (
                Error::Redirect {
                    url: "https://a".to_string(),
                    location: "https://b".to_string(),
                    status: 301,
                },
                "redirect",
            ),
            (Error::Other("test".to_string()), "other"),
        ];

        for (error, expected_category) in error_categories {
            assert_eq!(error.category(), expected_category);
        }
    }

    #[test]
    fn test_error_recoverability() {
        let recoverable = vec![
            Error::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted")),
            Error::Timeout("request timeout".to_string()),
        ];
        let permanent = vec![
            Error::Io(io::Error::new(io::ErrorKind::NotFound, "not found")),
            Error::Parse("bad syntax".to_string()),
            Error::Storage("constraint".to_string()),
            Error::Config("invalid".to_string()),
            Error::Cancelled("stop".to_string()),
            Error::Redirect {
                url: "https://a".to_string(),
                location: "https://b".to_string(),
                status: 302,
            },
        ];

        for error in recoverable {
            assert!(error.is_recoverable(), "expected {error:?} recoverable");
        }
        for error in permanent {
            assert!(!error.is_recoverable(), "expected {error:?} permanent");
        }
    }

    #[test]
    fn test_redirect_display_carries_both_urls() {
        let err = Error::Redirect {
            url: "https://docs.example.com/".to_string(),
            location: "https://example.com/docs".to_string(),
            status: 308,
        };
        let text = err.to_string();
        assert!(text.contains("docs.example.com"));
        assert!(text.contains("example.com/docs"));
        assert!(text.contains("308"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(Error::Cancelled("x".to_string()).is_cancelled());
        assert!(!Error::Other("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_chain_source() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_error.into();
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("access denied"));
    }
}
