//! Error types for the messaging layer

use thiserror::Error;

use crate::uid::Uid;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur while registering or routing on the message bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An endpoint with this owner UID is already registered
    #[error("Endpoint owner {uid} is already registered")]
    DuplicateUid {
        /// Offending owner UID
        uid: Uid,
    },

    /// No endpoint is registered for this owner UID
    #[error("No endpoint registered for {uid}")]
    UnknownEndpoint {
        /// Owner UID that was not found
        uid: Uid,
    },

    /// Routing table change attempted after the run started
    #[error("Cannot {operation} after the simulation has started")]
    ConcurrentModification {
        /// Operation that was rejected
        operation: String,
    },

    /// Text could not be parsed as a UID
    #[error("Invalid UID text {text:?}: {reason}")]
    InvalidUid {
        /// Input text
        text: String,
        /// Parser message
        reason: String,
    },
}

impl BusError {
    /// Create a concurrent modification error
    pub fn concurrent_modification(operation: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            operation: operation.into(),
        }
    }

    /// Create an invalid UID error
    pub fn invalid_uid(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUid {
            text: text.into(),
            reason: reason.into(),
        }
    }
}
