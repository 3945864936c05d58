//! Error types for the omnisweep protocol.

use crate::{Address, DomainId, OperationId, OperationStatus};
use thiserror::Error;

/// Main error type for omnisweep operations.
///
/// Every variant aborts the call that produced it with no state mutated.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Malformed request (length mismatch, zero domains, zero amount, ...).
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// A listed domain carries no instructions.
    #[error("Domain {domain} has no instructions")]
    EmptyInstructions { domain: DomainId },

    /// A dispatch request arrived with an empty batch.
    #[error("Dispatch request contains no instructions")]
    NoInstructions,

    /// Attached or reserved value cannot cover a quoted transport fee.
    #[error("Insufficient fee: required {required}, available {available}")]
    InsufficientFee { required: String, available: String },

    /// Message not from the configured or allow-listed counterpart.
    #[error("Unauthorized source: domain {domain}, sender {sender}")]
    UnauthorizedSource { domain: DomainId, sender: Address },

    /// Admin-only call made by someone else.
    #[error("Caller {caller} is not the administrator")]
    Unauthorized { caller: Address },

    /// A conversion venue call failed; the whole batch was abandoned.
    #[error("Adapter failure at venue {venue} for asset {asset}: {reason}")]
    AdapterFailure {
        venue: String,
        asset: String,
        reason: String,
    },

    /// Value bridge rejected or failed a transfer.
    #[error("Bridge failure: {0}")]
    BridgeFailure(String),

    /// Message transport failed to quote or send.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Custody or privacy hook failed to move value.
    #[error("Custody failure: {0}")]
    CustodyFailure(String),

    /// Wire payload could not be decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Operation not found.
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// Operation no longer accepts completions.
    #[error("Operation {operation_id} is closed ({status:?})")]
    OperationClosed {
        operation_id: OperationId,
        status: OperationStatus,
    },

    /// Partial settlement requested before the operation deadline.
    #[error("Operation {0} has not reached its deadline")]
    DeadlineNotReached(OperationId),

    /// Invalid state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    /// Coordinator is paused and not accepting new operations.
    #[error("Coordinator is paused")]
    CoordinatorPaused,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InputValidation,
    AuthorizationFailure,
    AdapterFailure,
    FeeInsufficiency,
    Infrastructure,
}

impl SweepError {
    /// Shorthand for an [`SweepError::InvalidInput`] without a field.
    pub fn invalid(message: impl Into<String>) -> Self {
        SweepError::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Shorthand for an [`SweepError::InvalidInput`] naming a field.
    pub fn invalid_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        SweepError::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SweepError::AdapterFailure { .. }
                | SweepError::BridgeFailure(_)
                | SweepError::TransportFailure(_)
                | SweepError::CustodyFailure(_)
                | SweepError::InsufficientFee { .. }
                | SweepError::CoordinatorPaused
        )
    }

    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SweepError::InvalidInput { .. }
            | SweepError::EmptyInstructions { .. }
            | SweepError::NoInstructions
            | SweepError::Codec(_) => ErrorCategory::InputValidation,
            SweepError::UnauthorizedSource { .. } | SweepError::Unauthorized { .. } => {
                ErrorCategory::AuthorizationFailure
            }
            SweepError::AdapterFailure { .. } => ErrorCategory::AdapterFailure,
            SweepError::InsufficientFee { .. } => ErrorCategory::FeeInsufficiency,
            _ => ErrorCategory::Infrastructure,
        }
    }

    /// Get error code for logs and receipts.
    pub fn error_code(&self) -> &'static str {
        match self {
            SweepError::InvalidInput { .. } => "INVALID_INPUT",
            SweepError::EmptyInstructions { .. } => "EMPTY_INSTRUCTIONS",
            SweepError::NoInstructions => "NO_INSTRUCTIONS",
            SweepError::InsufficientFee { .. } => "INSUFFICIENT_FEE",
            SweepError::UnauthorizedSource { .. } => "UNAUTHORIZED_SOURCE",
            SweepError::Unauthorized { .. } => "UNAUTHORIZED",
            SweepError::AdapterFailure { .. } => "ADAPTER_FAILURE",
            SweepError::BridgeFailure(_) => "BRIDGE_FAILURE",
            SweepError::TransportFailure(_) => "TRANSPORT_FAILURE",
            SweepError::CustodyFailure(_) => "CUSTODY_FAILURE",
            SweepError::Codec(_) => "CODEC_ERROR",
            SweepError::OperationNotFound(_) => "OPERATION_NOT_FOUND",
            SweepError::OperationClosed { .. } => "OPERATION_CLOSED",
            SweepError::DeadlineNotReached(_) => "DEADLINE_NOT_REACHED",
            SweepError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SweepError::CoordinatorPaused => "COORDINATOR_PAUSED",
            SweepError::Configuration(_) => "CONFIGURATION_ERROR",
            SweepError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for omnisweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;
