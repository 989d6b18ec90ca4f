//! Error types shared by the broker and the client proxy.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error kinds, no key material in messages
//! - SC-13: Cryptographic Protection - Context lookup failures are never silent

use crate::ids::{AlgorithmId, ContextKind};
use thiserror::Error;

/// Result type alias for security offload operations.
pub type Result<T> = std::result::Result<T, SecuError>;

/// Errors that can occur anywhere between the call site and the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecuError {
    /// The engine could not construct a context. Surfaced to callers as the
    /// "no context" sentinel.
    #[error("{kind} context init failed for algorithm {algorithm}: {reason}")]
    InitFailure {
        kind: ContextKind,
        algorithm: AlgorithmId,
        reason: String,
    },

    /// Compute referenced an id that is not live in the table of its kind.
    #[error("Unknown {kind} context: 0x{id:016x}")]
    UnknownContext { kind: ContextKind, id: u64 },

    /// Connectivity or remote-call failure.
    #[error("Transport failure: {message}")]
    Transport {
        /// True when the call may be repeated safely (peer unavailable).
        retryable: bool,
        message: String,
    },

    /// Response shorter than the fixed-size MAC or ciphertext expected.
    #[error("Malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    /// A request field is out of range.
    #[error("Invalid parameter {field}: {message}")]
    InvalidParameter {
        field: &'static str,
        message: String,
    },

    /// The engine accepted the context but failed to compute.
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// The 48-bit sequence space of the current epoch is used up.
    #[error("Context id space exhausted for epoch {epoch}")]
    IdSpaceExhausted { epoch: u16 },

    /// Configuration load or validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SecuError {
    /// Shorthand for [`SecuError::InvalidParameter`].
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SecuError::InvalidParameter {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for a non-retryable [`SecuError::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        SecuError::Transport {
            retryable: false,
            message: message.into(),
        }
    }

    /// Returns true if the failed call may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SecuError::Transport { retryable: true, .. })
    }

    /// Short stable label used in log fields and audit records.
    pub fn kind_label(&self) -> &'static str {
        match self {
            SecuError::InitFailure { .. } => "init_failure",
            SecuError::UnknownContext { .. } => "unknown_context",
            SecuError::Transport { .. } => "transport_failure",
            SecuError::MalformedResponse { .. } => "malformed_response",
            SecuError::InvalidParameter { .. } => "invalid_parameter",
            SecuError::EngineFailure(_) => "engine_failure",
            SecuError::IdSpaceExhausted { .. } => "id_space_exhausted",
            SecuError::Config(_) => "config",
        }
    }
}
