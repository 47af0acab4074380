//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid hash format (expected lowercase hex digest)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown enum value read from storage or configuration
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Name of the enum being parsed
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// Keyed hashing could not be initialised
    #[error("Hash key rejected: {0}")]
    InvalidKey(String),
}
