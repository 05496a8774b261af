//! Error types for the simulation runtime

use synbus_core::{BusError, Uid};
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while building or driving a simulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Message bus error
    #[error("Bus error: {source}")]
    Bus {
        /// Source bus error
        source: BusError,
    },

    /// Invalid construction settings
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A synapse or neuron index points outside its population
    #[error("{what} index {index} out of range (size {size})")]
    IndexOutOfRange {
        /// What the index refers to
        what: String,
        /// Offending index
        index: usize,
        /// Size of the indexed collection
        size: usize,
    },

    /// Population or spike source not registered with the backend
    #[error("Unknown population or spike source {uid}")]
    UnknownPopulation {
        /// UID that was not found
        uid: Uid,
    },

    /// Projection not registered with the backend
    #[error("Unknown projection {uid}")]
    UnknownProjection {
        /// UID that was not found
        uid: Uid,
    },

    /// UID already in use
    #[error("UID {uid} is already registered")]
    DuplicateUid {
        /// Offending UID
        uid: Uid,
    },

    /// Registration or subscription change after the run started
    #[error("Cannot {operation} after the simulation has started")]
    ConcurrentModification {
        /// Rejected operation
        operation: String,
    },
}

impl From<BusError> for RuntimeError {
    fn from(source: BusError) -> Self {
        match source {
            BusError::DuplicateUid { uid } => Self::DuplicateUid { uid },
            BusError::ConcurrentModification { operation } => {
                Self::ConcurrentModification { operation }
            }
            source => Self::Bus { source },
        }
    }
}

impl RuntimeError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an index out of range error
    pub fn index_out_of_range(what: impl Into<String>, index: usize, size: usize) -> Self {
        Self::IndexOutOfRange {
            what: what.into(),
            index,
            size,
        }
    }

    /// Create a concurrent modification error
    pub fn concurrent_modification(operation: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            operation: operation.into(),
        }
    }
}

/// Check that a float parameter is finite and inside `[min, max]`
pub(crate) fn check_range(parameter: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(RuntimeError::invalid_parameter(
            parameter,
            value.to_string(),
            format!("in [{}, {}]", min, max),
        ));
    }
    Ok(())
}

/// Check that a float parameter is finite
pub(crate) fn check_finite(parameter: &str, value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(RuntimeError::invalid_parameter(
            parameter,
            value.to_string(),
            "finite",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::invalid_config("empty population");
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));

        let err = RuntimeError::invalid_parameter("potential_decay", "1.5", "in [0, 1]");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::index_out_of_range("postsynaptic neuron", 10, 5);
        let msg = format!("{}", err);
        assert!(msg.contains("postsynaptic neuron index 10 out of range (size 5)"));
    }

    #[test]
    fn test_bus_error_mapping() {
        let err: RuntimeError = BusError::concurrent_modification("subscribe").into();
        assert!(matches!(err, RuntimeError::ConcurrentModification { .. }));

        let uid = Uid::new();
        let err: RuntimeError = BusError::DuplicateUid { uid }.into();
        assert_eq!(err, RuntimeError::DuplicateUid { uid });

        let err: RuntimeError = BusError::UnknownEndpoint { uid }.into();
        assert!(matches!(err, RuntimeError::Bus { .. }));
    }

    #[test]
    fn test_range_checks() {
        assert!(check_range("x", 0.5, 0.0, 1.0).is_ok());
        assert!(check_range("x", 1.5, 0.0, 1.0).is_err());
        assert!(check_range("x", f32::NAN, 0.0, 1.0).is_err());
        assert!(check_finite("x", f32::INFINITY).is_err());
    }
}
