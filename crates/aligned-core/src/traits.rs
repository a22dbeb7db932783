// crates/aligned-core/src/traits.rs

use async_trait::async_trait;

use crate::error::CoreError;
use crate::task::{ResponseDigest, SignedTaskResponse, TaskCreatedEvent, TaskSignature};

/// Signs response digests with the operator's key.
///
/// Implementations hold the private key and must never hand it out.
/// Implemented by `Ed25519Signer`; other schemes (e.g. BLS) plug in here.
pub trait TaskSigner: Send + Sync {
    /// Sign a 32-byte response digest.
    fn sign_digest(&self, digest: &ResponseDigest) -> Result<TaskSignature, CoreError>;

    /// Public key bytes that verify signatures from this signer.
    fn public_key(&self) -> Vec<u8>;

    /// Short scheme name for logs.
    fn scheme(&self) -> &'static str;
}

/// Decides whether the proof behind a task is correct.
///
/// Implemented by `PlaceholderVerifier` until a real verification backend
/// exists.
pub trait TaskVerifier: Send + Sync {
    fn verify(&self, event: &TaskCreatedEvent) -> Result<bool, CoreError>;
}

/// Outbound delivery of signed responses to the aggregator.
///
/// Retries and network semantics belong to the implementation.
#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(&self, response: &SignedTaskResponse) -> Result<(), CoreError>;
}
