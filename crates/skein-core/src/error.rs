//! Error types for Skein core operations

use crate::types::{EventHash, Generation};
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur building or decoding events
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Hex decoding failed
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Hash was not 32 bytes
    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    /// Self-parent and other-parent are the same event
    #[error("Event {0} names the same event as both parents")]
    DuplicateParents(EventHash),

    /// Generation does not exceed a parent's generation
    #[error("Generation {generation} does not exceed parent generation {parent}")]
    InvalidGeneration {
        generation: Generation,
        parent: Generation,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
