// crates/aligned-core/src/lib.rs
//
// aligned-core: Task response types, ABI encoding, digests and signing for
// the Aligned operator.
//
// Everything in this crate is synchronous and free of I/O. The operator
// crate wires these pieces into its run loop.

pub mod abi;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod task;
pub mod traits;
pub mod verifier;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use aligned_core::TaskResponse;`

pub use abi::{decode, encode, SchemaField, TASK_RESPONSE_SCHEMA};
pub use crypto::{digest, verify_signature, Ed25519Signer};
pub use error::{CoreError, EncodingError};
pub use identity::OperatorIdentity;
pub use task::{
    ResponseDigest, SignedTaskResponse, TaskCreatedEvent, TaskResponse, TaskSignature,
};
pub use traits::{ResponseSender, TaskSigner, TaskVerifier};
pub use verifier::PlaceholderVerifier;
