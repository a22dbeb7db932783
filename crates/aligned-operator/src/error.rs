// crates/aligned-operator/src/error.rs

use aligned_core::EncodingError;
use thiserror::Error;

/// Failure reported by an event subscription's error path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The transport under the subscription failed (RPC error, dropped
    /// connection, malformed response).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The subscription's error path closed without reporting a cause.
    #[error("Subscription closed")]
    Closed,
}

/// Errors surfaced by the operator run loop and its collaborators.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The first subscription could not be established.
    #[error("Could not subscribe to new tasks: {0}")]
    Subscribe(SubscriptionError),

    /// The retry policy gave up on re-establishing the subscription.
    #[error("Resubscription failed after {attempts} attempts")]
    ResubscribeExhausted { attempts: u32 },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Verification error: {0}")]
    Verification(String),

    /// Too many consecutive signing failures; the key is likely unusable.
    #[error("{failures} consecutive signing failures")]
    SigningFailuresExceeded { failures: u32 },

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
