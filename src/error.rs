//! Error types for rowkit.
//!
//! All errors go through the `Error` enum defined here. Usage errors
//! (malformed argument lists) are reported before the database is contacted;
//! everything else is surfaced from the driver verbatim, with `RowNotFound`
//! singled out so callers can treat "zero rows" as a non-error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("row not found")]
    RowNotFound,

    #[error("failed to decode column {column}: {message}")]
    Decode { column: usize, message: String },

    #[error("database error: {message}")]
    Database {
        message: String,
        /// e.g., "787" for a SQLite foreign key violation
        code: Option<String>,
    },

    #[error("transaction error: {message}")]
    Transaction { message: String },

    #[error("timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column.
    pub fn decode(column: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    /// Create a database error with an optional driver code.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Check if this error means the query produced zero rows.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RowNotFound)
    }

    /// Check if this error reports a missing parent row (a foreign-key or
    /// interleaved-parent violation).
    ///
    /// This matches on the database's error text, not a stable code, because
    /// not every backend surfaces one. Callers branching on it should treat a
    /// `false` as "unclassified", not "definitely something else".
    pub fn is_missing_parent(&self) -> bool {
        match self {
            Self::Database { message, .. } => {
                message.contains("is missing. Row cannot")
                    || message.contains("FOREIGN KEY constraint failed")
            }
            _ => false,
        }
    }
}

/// Translate `RowNotFound` into an absent result, passing every other error
/// through unchanged.
pub fn ok_if_not_found<T>(result: DbResult<T>) -> DbResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(Error::RowNotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Convert sqlx errors to rowkit errors.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::RowNotFound,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                Error::database(db_err.message(), code)
            }
            sqlx::Error::ColumnDecode { index, source } => Error::Decode {
                column: index.parse().unwrap_or(0),
                message: source.to_string(),
            },
            sqlx::Error::Decode(source) => Error::decode(0, source.to_string()),
            sqlx::Error::ColumnNotFound(col) => {
                Error::database(format!("column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => Error::database(
                format!("column index {} out of bounds (len: {})", index, len),
                None,
            ),
            sqlx::Error::PoolTimedOut => Error::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => Error::database("connection pool is closed", None),
            sqlx::Error::Io(io_err) => Error::database(format!("I/O error: {}", io_err), None),
            sqlx::Error::Protocol(msg) => {
                Error::database(format!("protocol error: {}", msg), None)
            }
            sqlx::Error::Configuration(msg) => {
                Error::database(format!("configuration error: {}", msg), None)
            }
            other => Error::database(other.to_string(), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, Error>;
