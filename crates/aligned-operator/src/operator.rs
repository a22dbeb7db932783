// crates/aligned-operator/src/operator.rs
//
// Operator run loop.
//
// Waits on three sources at once: the shutdown token, the subscription
// manager's signal, and the task event channel. Each new task is verified,
// ABI-encoded, hashed, signed and pushed to the delivery channel before the
// loop waits again.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aligned_core::{
    abi, crypto, OperatorIdentity, PlaceholderVerifier, SignedTaskResponse, TaskCreatedEvent,
    TaskResponse, TaskVerifier,
};

use crate::error::{OperatorError, SubscriptionError};
use crate::subscription::{RetryPolicy, SubscriptionManager, TaskSubscriber};

/// Default capacity of the task event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Watches for new tasks and signs a response for each one.
pub struct Operator {
    identity: OperatorIdentity,
    subscriber: Arc<dyn TaskSubscriber>,
    verifier: Arc<dyn TaskVerifier>,
    responses: mpsc::UnboundedSender<SignedTaskResponse>,
    retry_policy: RetryPolicy,
    event_buffer: usize,
    signing_failure_limit: Option<u32>,
    consecutive_signing_failures: u32,
}

impl Operator {
    /// Create an operator that reads tasks from `subscriber` and emits signed
    /// responses on `responses`.
    ///
    /// Uses [`PlaceholderVerifier`] and the default retry policy until
    /// overridden.
    pub fn new(
        identity: OperatorIdentity,
        subscriber: Arc<dyn TaskSubscriber>,
        responses: mpsc::UnboundedSender<SignedTaskResponse>,
    ) -> Self {
        Self {
            identity,
            subscriber,
            verifier: Arc::new(PlaceholderVerifier::new()),
            responses,
            retry_policy: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            signing_failure_limit: None,
            consecutive_signing_failures: 0,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TaskVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Stop with [`OperatorError::SigningFailuresExceeded`] after `limit`
    /// consecutive signing failures. `None` never stops.
    pub fn with_signing_failure_limit(mut self, limit: Option<u32>) -> Self {
        self.signing_failure_limit = limit;
        self
    }

    pub fn identity(&self) -> &OperatorIdentity {
        &self.identity
    }

    /// Run one task through verify, encode, digest and sign.
    pub fn process_task(
        &self,
        event: &TaskCreatedEvent,
    ) -> Result<SignedTaskResponse, OperatorError> {
        let proof_is_correct = self
            .verifier
            .verify(event)
            .map_err(|e| OperatorError::Verification(e.to_string()))?;

        let task_response = TaskResponse::new(event.task_index, proof_is_correct);
        let encoded = abi::encode(&task_response)?;
        let digest = crypto::digest(&encoded);
        let signature = self
            .identity
            .signer()
            .sign_digest(&digest)
            .map_err(|e| OperatorError::Signing(e.to_string()))?;

        tracing::debug!(
            "Task {}: encoded 0x{} digest {}",
            event.task_index,
            hex::encode(&encoded),
            digest
        );

        Ok(SignedTaskResponse {
            task_response,
            encoded,
            digest,
            signature,
            operator_id: self.identity.operator_id(),
        })
    }

    /// Run the operator until `shutdown` is cancelled.
    ///
    /// Returns `Ok(())` on shutdown. Returns an error if the first
    /// subscription cannot be opened, if the retry policy gives up, or if
    /// the signing failure limit is reached.
    pub async fn start(mut self, shutdown: CancellationToken) -> Result<(), OperatorError> {
        tracing::info!(
            "Operator {} starting (address {}, socket {})",
            self.identity.operator_id(),
            self.identity.address(),
            self.identity.socket()
        );

        let (mut subscription, mut events) = SubscriptionManager::establish(
            self.subscriber.clone(),
            self.retry_policy.clone(),
            shutdown.clone(),
            self.event_buffer,
        )
        .await?;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Operator shutting down...");
                    subscription.close();
                    return Ok(());
                }
                signal = subscription.signal() => {
                    if let Err(e) = subscription.on_signal(signal).await {
                        subscription.close();
                        return Err(e);
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        subscription.close();
                        return Err(OperatorError::Subscribe(SubscriptionError::Closed));
                    };
                    subscription.mark_healthy();
                    if let Err(e) = self.handle_task(event) {
                        subscription.close();
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Process one task. Per-task failures are logged and swallowed; only
    /// the signing failure limit escalates.
    fn handle_task(&mut self, event: TaskCreatedEvent) -> Result<(), OperatorError> {
        tracing::info!("Received new task {}", event.task_index);

        match self.process_task(&event) {
            Ok(signed) => {
                self.consecutive_signing_failures = 0;
                tracing::info!(
                    "Signed response for task {} (proof_is_correct={}, digest {})",
                    signed.task_index(),
                    signed.task_response.proofIsCorrect,
                    signed.digest
                );
                if self.responses.send(signed).is_err() {
                    tracing::warn!(
                        "Delivery channel closed, dropping response for task {}",
                        event.task_index
                    );
                }
                Ok(())
            }
            Err(OperatorError::Signing(msg)) => {
                self.consecutive_signing_failures += 1;
                tracing::error!(
                    "Failed to sign response for task {}: {} ({} consecutive failures)",
                    event.task_index,
                    msg,
                    self.consecutive_signing_failures
                );
                match self.signing_failure_limit {
                    Some(limit) if self.consecutive_signing_failures >= limit => {
                        Err(OperatorError::SigningFailuresExceeded {
                            failures: self.consecutive_signing_failures,
                        })
                    }
                    _ => Ok(()),
                }
            }
            Err(e) => {
                tracing::error!("Dropping task {}: {}", event.task_index, e);
                Ok(())
            }
        }
    }
}
