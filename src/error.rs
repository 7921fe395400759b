//! Error types for LIFT8

use thiserror::Error;

use crate::negotiation::types::NegotiationStatus;

/// Main error type for LIFT8
#[derive(Error, Debug)]
pub enum Lift8Error {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Offer {offer:.2} is outside the allowed range: it must be between {min:.2} and {max:.2}")]
    OutOfRange { offer: f64, min: f64, max: f64 },

    // Negotiation errors
    #[error("Cannot {action} a negotiation that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: NegotiationStatus,
    },

    #[error("Consumer {consumer_id} already has pending negotiation {existing_id} for truck {truck_id}")]
    DuplicatePending {
        consumer_id: String,
        truck_id: String,
        existing_id: String,
    },

    #[error("{participant_id} is not allowed to {action} negotiation {negotiation_id}")]
    NotParticipant {
        participant_id: String,
        negotiation_id: String,
        action: &'static str,
    },

    // Store errors
    #[error("Negotiation {id} was modified concurrently: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: NegotiationStatus,
        actual: NegotiationStatus,
    },

    #[error("Negotiation not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store unavailable after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Lift8Error>,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // General errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Lift8Error {
    /// Whether the failure is transient and may succeed if the same call is repeated.
    ///
    /// Conflicts are not retryable as-is: the caller has to re-read the record first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Lift8Error::Store(_))
    }

    /// Whether the failure is a correctable input error to show the user.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Lift8Error::InvalidInput(_)
                | Lift8Error::OutOfRange { .. }
                | Lift8Error::InvalidTransition { .. }
                | Lift8Error::DuplicatePending { .. }
                | Lift8Error::NotParticipant { .. }
        )
    }
}

/// Result type alias for LIFT8 operations
pub type Result<T> = std::result::Result<T, Lift8Error>;
