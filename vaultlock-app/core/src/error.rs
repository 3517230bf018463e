//! Error types for security-settings operations.
//!
//! Every variant carries a stable error code so the UI layer can decide
//! what to render without matching on message text.

use thiserror::Error;

/// Errors that can occur while reading or changing the security settings.
///
/// Apart from `Triggered`, none of these leave the settings, the PIN
/// verifier or the failure counter in a different state than before the
/// failed call.
#[derive(Error, Debug)]
pub enum SecurityError {
    /// A value outside one of the enumerated option sets.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// The requested change would break a cross-field rule,
    /// e.g. enabling delete-on-failure without a PIN.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Turning the PIN gate on requires a committed PIN first.
    /// The set-PIN flow has been started.
    #[error("A PIN must be set before the PIN gate can be enabled")]
    PinRequired,

    /// The entered PIN does not match the stored verifier.
    #[error("Invalid PIN ({remaining} attempts remaining)")]
    VerificationFailed { remaining: u32 },

    /// The confirmation did not match the new PIN. The flow is back to
    /// asking for a new PIN.
    #[error("PIN confirmation does not match")]
    ConfirmationMismatch,

    /// The candidate PIN does not satisfy the PIN policy.
    #[error("Invalid PIN format: {0}")]
    InvalidPin(String),

    #[error("No PIN is set")]
    NoPinSet,

    #[error("A PIN is already set")]
    PinAlreadySet,

    #[error("A PIN flow is already in progress")]
    FlowInProgress,

    #[error("No PIN flow is in progress")]
    NoFlowInProgress,

    /// The credential store rejected a read or write.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Argon2 rejected its parameters or failed to hash.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// The failed-attempt threshold was reached and all secrets were wiped.
    #[error("Too many failed attempts - vault data has been erased")]
    Triggered,
}

/// Result type alias for security-settings operations.
pub type Result<T> = std::result::Result<T, SecurityError>;

impl SecurityError {
    /// Stable identifier for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::InvalidOption(_) => "INVALID_OPTION",
            SecurityError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            SecurityError::PinRequired => "PIN_REQUIRED",
            SecurityError::VerificationFailed { .. } => "VERIFICATION_FAILED",
            SecurityError::ConfirmationMismatch => "CONFIRMATION_MISMATCH",
            SecurityError::InvalidPin(_) => "INVALID_PIN",
            SecurityError::NoPinSet => "NO_PIN_SET",
            SecurityError::PinAlreadySet => "PIN_ALREADY_SET",
            SecurityError::FlowInProgress => "FLOW_IN_PROGRESS",
            SecurityError::NoFlowInProgress => "NO_FLOW_IN_PROGRESS",
            SecurityError::Persistence(_) => "PERSISTENCE_FAILURE",
            SecurityError::Io(_) => "IO_ERROR",
            SecurityError::Serialization(_) => "SERIALIZATION_ERROR",
            SecurityError::KeyDerivation(_) => "KEY_DERIVATION_ERROR",
            SecurityError::Triggered => "TRIGGERED",
        }
    }

    /// Whether the error came from the credential store.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            SecurityError::Persistence(_) | SecurityError::Io(_) | SecurityError::Serialization(_)
        )
    }
}

// ============================================================================
// Serialization for the UI layer
// ============================================================================

impl serde::Serialize for SecurityError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SecurityError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
