//! Common error types for span
//!
//! Variants follow the failure classes of the attachment engine:
//! configuration errors, transient fetch errors, unreadable holdings data,
//! store/query errors and index errors are all fatal for the batch that hit
//! them. Malformed holdings rows and records without matching rules never
//! surface here; they are logged and absorbed where they occur.

use thiserror::Error;

/// Common result type for span operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the span tools
#[derive(Error, Debug)]
pub enum Error {
    /// Rule store operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bootstrap configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attachment rule that matches no valid attachment mode
    #[error("Invalid attachment rule {rule}: {reason}")]
    Rule { rule: String, reason: String },

    /// Malformed filter declaration
    #[error("Invalid filter configuration: {0}")]
    Filter(String),

    /// Connection-level failure while fetching a link
    #[error("Network error fetching {link}: {message}")]
    Network { link: String, message: String },

    /// Non-success HTTP status while fetching a link
    #[error("HTTP {status} fetching {link}")]
    Http { link: String, status: u16 },

    /// Retries exhausted for a link
    #[error("Giving up on {link} after {attempts} attempts: {last}")]
    FetchExhausted {
        link: String,
        attempts: u32,
        last: String,
    },

    /// Archive container that opened but could not be read
    #[error("Unreadable archive {reference}: {message}")]
    Archive { reference: String, message: String },

    /// Holdings file that could not be read at all
    #[error("Unreadable holdings file {reference}: {message}")]
    Holdings { reference: String, message: String },

    /// Search index query failure during deduplication
    #[error("Index error ({server}): {message}")]
    Index { server: String, message: String },

    /// Input line that is not a decodable record
    #[error("Invalid record on input line {line}: {message}")]
    Input { line: u64, message: String },

    /// Fatal error raised while labelling a single record
    #[error("Record {record_id}: {source}")]
    Record {
        record_id: String,
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Connection failures, server errors (5xx) and rate limiting (429) are
    /// transient; everything else fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Attach the identifier of the record being processed.
    pub fn for_record(self, record_id: impl Into<String>) -> Self {
        match self {
            // Already carries record context
            err @ Error::Record { .. } => err,
            err => Error::Record {
                record_id: record_id.into(),
                source: Box::new(err),
            },
        }
    }
}
