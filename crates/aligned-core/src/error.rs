use thiserror::Error;

/// Errors raised while encoding or decoding a task response against the
/// on-chain tuple schema.
///
/// None of these are retryable: they mean the Rust schema and the contract's
/// struct no longer agree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// A schema field carries a type descriptor that cannot be parsed or is
    /// not a static scalar type.
    #[error("Invalid type descriptor `{descriptor}` for field `{field}`")]
    InvalidType {
        field: &'static str,
        descriptor: &'static str,
    },

    /// The packed bytes do not match the word layout the schema declares.
    #[error("Encoded layout mismatch: expected {expected} bytes, got {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    /// ABI decoding rejected the input bytes.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Error type shared by the core primitives of the operator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Response encoding failed (schema/contract mismatch).
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Cryptographic error (key loading, signing, verification).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The task verification step could not reach a verdict.
    #[error("Verification error: {0}")]
    Verification(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network error while talking to a collaborator (aggregator, node).
    #[error("Network error: {0}")]
    Network(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        CoreError::Crypto(e.to_string())
    }
}

impl From<hex::FromHexError> for CoreError {
    fn from(e: hex::FromHexError) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
