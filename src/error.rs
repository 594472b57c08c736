//! Error types for the ramp orchestrator

use crate::ramp::{Network, RampPhase};

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum RampError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ramp {0} not found")]
    NotFound(Uuid),

    #[error("Cannot execute phase {expected} for ramp in phase {actual}")]
    PhaseMismatch {
        expected: RampPhase,
        actual: RampPhase,
    },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: RampPhase, to: RampPhase },

    #[error("Phase {phase}: required metadata `{field}` is missing")]
    MissingMetadata {
        phase: RampPhase,
        field: &'static str,
    },

    #[error("External chain error on {network}: {message}")]
    ExternalChain { network: Network, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Unrecoverable: {0}")]
    Unrecoverable(String),

    #[error("Processing lease for ramp {0} was lost to another owner")]
    LeaseLost(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Nonce error on {network}: {message}")]
    Nonce { network: Network, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RampError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RampError::ExternalChain { .. } | RampError::Timeout { .. } | RampError::Nonce { .. }
        )
    }

    /// Build an external chain error from anything displayable
    pub fn chain(network: Network, err: impl std::fmt::Display) -> Self {
        RampError::ExternalChain {
            network,
            message: err.to_string(),
        }
    }
}

/// Result type for orchestrator operations
pub type RampResult<T> = Result<T, RampError>;
