// crates/aligned-core/src/task.rs
//
// Task lifecycle types: the event the service manager emits when a task is
// created, the response struct the contract verifies, and the signed
// response handed to the aggregator.

use std::fmt;

use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};

alloy_sol_types::sol! {
    /// Operator verdict for a single task.
    ///
    /// Mirrors the service manager's Solidity struct field for field. The
    /// declaration order is part of the on-chain ABI.
    #[derive(Debug, PartialEq, Eq)]
    struct TaskResponse {
        uint64 taskIndex;
        bool proofIsCorrect;
    }
}

impl TaskResponse {
    /// Build a response for the given task.
    pub fn new(task_index: u64, proof_is_correct: bool) -> Self {
        Self {
            taskIndex: task_index,
            proofIsCorrect: proof_is_correct,
        }
    }
}

/// Keccak-256 digest of an ABI-encoded [`TaskResponse`].
pub type ResponseDigest = B256;

/// A `NewTaskCreated` notification observed on the service manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreatedEvent {
    /// Monotonic index assigned by the contract.
    pub task_index: u64,
    /// Block the event was included in, when the transport knows it.
    pub block_number: Option<u64>,
    /// Hash of the transaction that created the task.
    pub transaction_hash: Option<B256>,
    /// Raw non-indexed event data (the task body).
    pub data: Bytes,
}

impl TaskCreatedEvent {
    /// Event carrying only a task index, without chain metadata.
    pub fn with_index(task_index: u64) -> Self {
        Self {
            task_index,
            block_number: None,
            transaction_hash: None,
            data: Bytes::new(),
        }
    }
}

/// Signature bytes produced by a [`crate::traits::TaskSigner`].
///
/// The byte layout depends on the signing scheme; the operator treats it as
/// opaque.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature(pub Vec<u8>);

impl TaskSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TaskSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for TaskSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskSignature({})", self)
    }
}

/// A fully processed task, ready for delivery to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTaskResponse {
    pub task_response: TaskResponse,
    /// Canonical ABI encoding of `task_response`, kept for audit.
    pub encoded: Vec<u8>,
    pub digest: ResponseDigest,
    pub signature: TaskSignature,
    pub operator_id: B256,
}

impl SignedTaskResponse {
    pub fn task_index(&self) -> u64 {
        self.task_response.taskIndex
    }
}
