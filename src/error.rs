//! Unified error handling for the track-kinematics library.
//!
//! Every fallible operation returns [`Result`]. Configuration problems are
//! detected before a point set is touched, so an `Err` always means the input
//! was left unmodified.

use std::fmt;

/// Unified error type for trajectory operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    /// A required input column is absent from a record
    MissingColumn { column: String, row: usize },
    /// Parallel input arrays have different lengths
    MismatchedLengths {
        what: String,
        expected: usize,
        actual: usize,
    },
    /// A policy or mode name was not recognised
    UnknownPolicy { kind: String, name: String },
    /// A threshold or coefficient is outside its valid range
    InvalidParameter {
        name: String,
        value: f64,
        reason: String,
    },
    /// A record holds a value of the wrong type
    InvalidValue {
        column: String,
        row: usize,
        message: String,
    },
    /// An operation needs derived columns that have not been computed
    MissingPrerequisite {
        operation: String,
        requirement: String,
    },
    /// JSON encoding/decoding failed
    Serialization { message: String },
}

impl fmt::Display for TrajectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryError::MissingColumn { column, row } => {
                write!(f, "Record {} is missing required column '{}'", row, column)
            }
            TrajectoryError::MismatchedLengths {
                what,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Mismatched lengths for {}: expected {}, got {}",
                    what, expected, actual
                )
            }
            TrajectoryError::UnknownPolicy { kind, name } => {
                write!(f, "Unknown {} '{}'", kind, name)
            }
            TrajectoryError::InvalidParameter {
                name,
                value,
                reason,
            } => {
                write!(f, "Invalid parameter {} = {}: {}", name, value, reason)
            }
            TrajectoryError::InvalidValue {
                column,
                row,
                message,
            } => {
                write!(
                    f,
                    "Invalid value in column '{}' of record {}: {}",
                    column, row, message
                )
            }
            TrajectoryError::MissingPrerequisite {
                operation,
                requirement,
            } => {
                write!(f, "{} requires {}", operation, requirement)
            }
            TrajectoryError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrajectoryError {}

impl From<serde_json::Error> for TrajectoryError {
    fn from(err: serde_json::Error) -> Self {
        TrajectoryError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trajectory operations.
pub type Result<T> = std::result::Result<T, TrajectoryError>;

/// Reject thresholds that are NaN or negative.
pub(crate) fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(TrajectoryError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: "must be a non-negative number".to_string(),
        });
    }
    Ok(())
}

/// Reject thresholds that are NaN, zero or negative.
pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(TrajectoryError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
