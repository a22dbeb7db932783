// crates/aligned-core/src/verifier.rs
//
// PlaceholderVerifier: implements TaskVerifier without checking anything.
//
// Every task is answered with proofIsCorrect = true until a real proof
// verification backend replaces it.

use crate::error::CoreError;
use crate::task::TaskCreatedEvent;
use crate::traits::TaskVerifier;

/// A verifier that accepts every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderVerifier;

impl PlaceholderVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl TaskVerifier for PlaceholderVerifier {
    fn verify(&self, _event: &TaskCreatedEvent) -> Result<bool, CoreError> {
        Ok(true)
    }
}
