use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Error type for geostore operations.
#[derive(Error, Debug)]
pub enum GeoError {
    /// IO error from sockets or files.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Error from the sled storage engine.
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// An empty key was passed to a store operation.
    #[error("Invalid key. Expected a non-empty string.")]
    InvalidKey,

    /// The store client has no open connection.
    #[error("Store client is not connected")]
    NotConnected,

    /// A watched key kept changing until the attempts ran out.
    #[error("Transaction on '{key}' conflicted {attempts} times")]
    TransactionConflict {
        /// The watched key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Error reported by the store server.
    #[error("Store error: {0}")]
    Store(String),

    /// A lock was poisoned by a panicking thread.
    #[error("Lock poisoned")]
    Poisoned,

    /// Error with a plain message.
    #[error("{0}")]
    StringError(String),
}

impl GeoError {
    /// Returns `true` when the error means the connection can no longer be used.
    pub fn is_transport(&self) -> bool {
        match self {
            GeoError::Io(_) => true,
            GeoError::Serde(e) => e.is_io() || e.is_eof(),
            _ => false,
        }
    }
}

impl<T> From<PoisonError<T>> for GeoError {
    fn from(_: PoisonError<T>) -> Self {
        GeoError::Poisoned
    }
}

/// Result type alias for geostore operations.
pub type Result<T> = std::result::Result<T, GeoError>;
