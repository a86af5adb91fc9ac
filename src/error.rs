//! Error types for the TableFilter membership index.

use std::fmt;
use std::io;

/// The result type used throughout TableFilter.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for TableFilter operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// The persisted filter store exists but cannot be read or parsed.
    Corruption(String),

    /// A serialization or deserialization error occurred.
    Serialization(String),

    /// An invalid argument was provided.
    InvalidArgument(String),

    /// A membership lookup was issued against a system keyspace.
    DisallowedLookup(String),

    /// An operation was invoked before `initialize()` or after `shutdown()`.
    Uninitialized,

    /// An internal error occurred.
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new disallowed lookup error for the given keyspace.
    pub fn disallowed_lookup(keyspace: impl Into<String>) -> Self {
        Error::DisallowedLookup(keyspace.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Corruption(msg) => write!(f, "Filter store corruption: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::DisallowedLookup(ks) => {
                write!(f, "Key lookup from system keyspace ({}) is not allowed", ks)
            }
            Error::Uninitialized => write!(f, "Filter service not initialized"),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
