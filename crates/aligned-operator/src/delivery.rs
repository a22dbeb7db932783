// crates/aligned-operator/src/delivery.rs
//
// Hands signed task responses to the aggregator.
//
// The run loop pushes onto an unbounded channel and never waits on the
// network. A single delivery task drains the channel in order. Failures are
// logged and the response is dropped; there is no retry here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use aligned_core::{CoreError, ResponseSender, SignedTaskResponse};

use crate::http;

/// JSON method the aggregator exposes for operator submissions.
pub const SUBMIT_METHOD: &str = "aggregator/submit_signed_response";

/// Drain `responses` and send each one through `sender`, in order.
///
/// Returns once every sender half of the channel has been dropped.
pub async fn run_delivery_loop(
    mut responses: mpsc::UnboundedReceiver<SignedTaskResponse>,
    sender: Arc<dyn ResponseSender>,
) {
    let mut delivered = 0u64;
    let mut failed = 0u64;

    while let Some(response) = responses.recv().await {
        match sender.send(&response).await {
            Ok(()) => {
                delivered += 1;
                tracing::debug!("Delivered response for task {}", response.task_index());
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    "Failed to deliver response for task {}: {}",
                    response.task_index(),
                    e
                );
            }
        }
    }

    tracing::info!(
        "Delivery loop finished: {} delivered, {} failed",
        delivered,
        failed
    );
}

/// Wire form of a signed response. Byte fields are 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponsePayload {
    pub task_index: u64,
    pub proof_is_correct: bool,
    pub encoded_response: String,
    pub digest: String,
    pub signature: String,
    pub operator_id: String,
}

impl From<&SignedTaskResponse> for SignedResponsePayload {
    fn from(response: &SignedTaskResponse) -> Self {
        Self {
            task_index: response.task_response.taskIndex,
            proof_is_correct: response.task_response.proofIsCorrect,
            encoded_response: format!("0x{}", hex::encode(&response.encoded)),
            digest: response.digest.to_string(),
            signature: response.signature.to_string(),
            operator_id: response.operator_id.to_string(),
        }
    }
}

/// Response envelope returned by the aggregator.
#[derive(Deserialize)]
struct RpcResponse {
    success: bool,
    error: Option<String>,
}

/// Posts signed responses to the aggregator's JSON endpoint.
#[derive(Debug, Clone)]
pub struct AggregatorClient {
    url: String,
    client: reqwest::Client,
}

impl AggregatorClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: http::client_with_timeout(timeout),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ResponseSender for AggregatorClient {
    async fn send(&self, response: &SignedTaskResponse) -> Result<(), CoreError> {
        let request_body = serde_json::json!({
            "method": SUBMIT_METHOD,
            "params": SignedResponsePayload::from(response),
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("HTTP error: {}", e)))?;

        if !resp.status().is_success() {
            return Err(CoreError::Network(format!(
                "Aggregator returned status {}",
                resp.status()
            )));
        }

        let rpc_resp: RpcResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Serialization(format!("Failed to parse response: {}", e)))?;

        if !rpc_resp.success {
            return Err(CoreError::Network(
                rpc_resp
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        Ok(())
    }
}

/// Logs signed responses instead of sending them. Used when no aggregator
/// is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl ResponseSender for LogSender {
    async fn send(&self, response: &SignedTaskResponse) -> Result<(), CoreError> {
        let payload = SignedResponsePayload::from(response);
        tracing::info!(
            "Signed response (no aggregator configured): {}",
            serde_json::to_string(&payload)?
        );
        Ok(())
    }
}
