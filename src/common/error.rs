//! Error handling for the Slate engine

use std::fmt;

/// Common result type for Slate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Slate engine operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// I/O operation failed
    Io(String),
    /// On-disk data failed validation (bad CRC, truncated record, bad tag)
    Corruption(String),
    /// Invalid input or arguments
    InvalidInput(String),
    /// A transaction was driven through an illegal status transition
    TransactionState(String),
    /// A participant failed after the global commit/abort decision was made
    CommitInconsistency(String),
    /// Internal engine error
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
            Error::Corruption(msg) => write!(f, "Data corruption: {msg}"),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Error::TransactionState(msg) => write!(f, "Transaction state: {msg}"),
            Error::CommitInconsistency(msg) => {
                write!(f, "Post-decision inconsistency: {msg}")
            }
            Error::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create an I/O error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Error::Io(msg.into())
    }

    /// Create a corruption error
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a transaction state error
    pub fn transaction_state<S: Into<String>>(msg: S) -> Self {
        Error::TransactionState(msg.into())
    }

    /// Create a post-decision inconsistency error
    pub fn commit_inconsistency<S: Into<String>>(msg: S) -> Self {
        Error::CommitInconsistency(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this is an I/O error
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this is a corruption error
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// Check if this is a post-decision inconsistency
    pub fn is_commit_inconsistency(&self) -> bool {
        matches!(self, Error::CommitInconsistency(_))
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the engine in a well-defined state the caller
    /// can retry or abort from. Corruption and post-decision inconsistencies
    /// require manual intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(_) | Error::InvalidInput(_) | Error::TransactionState(_) => true,
            Error::Corruption(_) | Error::CommitInconsistency(_) | Error::Internal(_) => false,
        }
    }
}
