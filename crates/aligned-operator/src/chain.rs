// crates/aligned-operator/src/chain.rs
//
// Task subscription over plain Ethereum JSON-RPC.
//
// Each subscription spawns a poller that calls eth_blockNumber and
// eth_getLogs for the service manager's task-creation topic. Any RPC failure
// is reported on the subscription's error path and the poller exits; the
// subscription manager then opens a new one.
//
// The subscriber remembers the first block it has not fully delivered, so a
// new subscription picks up where the failed one stopped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use aligned_core::TaskCreatedEvent;

use crate::config::OperatorConfig;
use crate::error::SubscriptionError;
use crate::http;
use crate::subscription::{Subscription, TaskSubscriber};

/// Largest block range requested in one eth_getLogs call.
pub const MAX_BLOCK_RANGE: u64 = 1_000;

/// Shortest poll interval the subscriber will use.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The chain queries the log poller needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, SubscriptionError>;

    /// Logs emitted by `address` with `topic0` in `[from_block, to_block]`.
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: Address,
        topic0: B256,
    ) -> Result<Vec<RpcLog>, SubscriptionError>;
}

/// Minimal JSON-RPC 2.0 client for the calls the subscriber needs.
#[derive(Debug, Clone)]
pub struct EthRpc {
    url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A log entry as returned by eth_getLogs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<String>,
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub removed: bool,
}

impl EthRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: http::client_with_timeout(timeout),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, SubscriptionError> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SubscriptionError::Transport(format!("{}: HTTP error: {}", method, e)))?;

        let rpc_resp: RpcResponse<T> = resp.json().await.map_err(|e| {
            SubscriptionError::Transport(format!("{}: failed to parse response: {}", method, e))
        })?;

        if let Some(err) = rpc_resp.error {
            return Err(SubscriptionError::Transport(format!(
                "{}: RPC error {}: {}",
                method, err.code, err.message
            )));
        }

        rpc_resp.result.ok_or_else(|| {
            SubscriptionError::Transport(format!("{}: no result in response", method))
        })
    }
}

#[async_trait]
impl ChainClient for EthRpc {
    async fn block_number(&self) -> Result<u64, SubscriptionError> {
        let quantity: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: Address,
        topic0: B256,
    ) -> Result<Vec<RpcLog>, SubscriptionError> {
        let filter = serde_json::json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": address,
            "topics": [topic0],
        }]);
        self.call("eth_getLogs", filter).await
    }
}

/// Parse a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn parse_quantity(quantity: &str) -> Result<u64, SubscriptionError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| SubscriptionError::Transport(format!("Invalid quantity: {}", quantity)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| SubscriptionError::Transport(format!("Invalid quantity {}: {}", quantity, e)))
}

/// Turn a `NewTaskCreated` log into an event.
///
/// The task index is the first indexed argument (`topics[1]`), a uint64
/// left-padded to 32 bytes. Returns `None` if the log does not have that
/// shape. A malformed `blockNumber` only loses the block number.
pub fn decode_task_log(log: &RpcLog) -> Option<TaskCreatedEvent> {
    let word = log.topics.get(1)?;
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut index = [0u8; 8];
    index.copy_from_slice(&word[24..]);
    let task_index = u64::from_be_bytes(index);

    let block_number = log
        .block_number
        .as_deref()
        .and_then(|q| match parse_quantity(q) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::warn!("Task {} log has a bad block number: {}", task_index, e);
                None
            }
        });

    Some(TaskCreatedEvent {
        task_index,
        block_number,
        transaction_hash: log.transaction_hash,
        data: log.data.clone(),
    })
}

/// [`TaskSubscriber`] backed by eth_getLogs polling.
pub struct RpcTaskSubscriber {
    client: Arc<dyn ChainClient>,
    service_manager: Address,
    event_topic: B256,
    poll_interval: Duration,
    /// First block not yet fully delivered. `None` until the first subscribe.
    next_block: Arc<Mutex<Option<u64>>>,
}

impl RpcTaskSubscriber {
    /// Poll intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(
        client: Arc<dyn ChainClient>,
        service_manager: Address,
        event_signature: &str,
        poll_interval: Duration,
    ) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                "Poll interval {:?} is too short, using {:?}",
                poll_interval,
                MIN_POLL_INTERVAL
            );
        }
        Self {
            client,
            service_manager,
            event_topic: keccak256(event_signature.as_bytes()),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            next_block: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(
            Arc::new(EthRpc::new(config.eth_rpc_url.clone(), config.timeout())),
            config.service_manager_address,
            &config.task_created_signature,
            config.poll_interval(),
        )
    }

    /// topic0 the subscriber filters on.
    pub fn event_topic(&self) -> B256 {
        self.event_topic
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// First block the next subscription will read from, once known.
    pub fn checkpoint(&self) -> Option<u64> {
        *self.next_block.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TaskSubscriber for RpcTaskSubscriber {
    async fn subscribe(
        &self,
        sink: mpsc::Sender<TaskCreatedEvent>,
        cancel: CancellationToken,
    ) -> Result<Subscription, SubscriptionError> {
        let from_block = match self.checkpoint() {
            Some(block) => block,
            None => self.client.block_number().await? + 1,
        };
        tracing::info!(
            "Polling {} for new tasks from block {}",
            self.service_manager,
            from_block
        );

        let (error_tx, error_rx) = mpsc::channel(1);
        let poller = LogPoller {
            client: self.client.clone(),
            service_manager: self.service_manager,
            event_topic: self.event_topic,
            poll_interval: self.poll_interval,
            next_block: from_block,
            checkpoint: self.next_block.clone(),
        };
        tokio::spawn(poller.run(sink, error_tx, cancel.clone()));

        Ok(Subscription::new(error_rx, cancel))
    }
}

struct LogPoller {
    client: Arc<dyn ChainClient>,
    service_manager: Address,
    event_topic: B256,
    poll_interval: Duration,
    next_block: u64,
    checkpoint: Arc<Mutex<Option<u64>>>,
}

impl LogPoller {
    async fn run(
        mut self,
        sink: mpsc::Sender<TaskCreatedEvent>,
        errors: mpsc::Sender<SubscriptionError>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.poll_interval.max(MIN_POLL_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Log poller cancelled at block {}", self.next_block);
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.poll_once(&sink, &cancel).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    let _ = errors.send(e).await;
                    return;
                }
            }
        }
    }

    /// Fetch and forward one range of logs. Returns `Ok(false)` when the
    /// poller should stop quietly (sink gone or cancelled).
    async fn poll_once(
        &mut self,
        sink: &mpsc::Sender<TaskCreatedEvent>,
        cancel: &CancellationToken,
    ) -> Result<bool, SubscriptionError> {
        let head = self.client.block_number().await?;
        if head < self.next_block {
            return Ok(true);
        }
        let to_block = head.min(self.next_block + MAX_BLOCK_RANGE - 1);

        let logs = self
            .client
            .get_logs(self.next_block, to_block, self.service_manager, self.event_topic)
            .await?;

        for log in logs.iter().filter(|log| !log.removed) {
            let Some(event) = decode_task_log(log) else {
                tracing::warn!("Skipping malformed task log: {:?}", log);
                continue;
            };
            // A cancelled poller must not push into a sink its successor owns.
            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = sink.send(event) => sent.is_ok(),
            };
            if !delivered {
                return Ok(false);
            }
        }

        self.next_block = to_block + 1;
        *self.checkpoint.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.next_block);
        tracing::trace!("Delivered logs up to block {}", to_block);
        Ok(true)
    }
}
