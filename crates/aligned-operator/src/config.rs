// crates/aligned-operator/src/config.rs
//
// Runtime configuration for the operator.
// Loaded from a TOML file or populated with sensible defaults.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use serde::Deserialize;

use aligned_core::{Ed25519Signer, OperatorIdentity};

use crate::error::OperatorError;

/// Runtime configuration for the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// HTTP JSON-RPC endpoint of the Ethereum node.
    #[serde(default = "default_eth_rpc_url")]
    pub eth_rpc_url: String,

    /// Address of the service manager contract that emits `NewTaskCreated`.
    #[serde(default)]
    pub service_manager_address: Address,

    /// Canonical signature of the task-creation event. Its keccak256 is the
    /// log topic the subscriber filters on, so it must match the deployed
    /// contract exactly.
    #[serde(default = "default_task_created_signature")]
    pub task_created_signature: String,

    /// How often the chain subscriber polls for new logs, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Aggregator RPC endpoint. When unset, signed responses are only logged.
    #[serde(default)]
    pub aggregator_url: Option<String>,

    /// The operator's on-chain address.
    #[serde(default)]
    pub operator_address: Address,

    /// The operator's id in the registry coordinator.
    #[serde(default)]
    pub operator_id: B256,

    /// Socket advertised by this operator.
    #[serde(default = "default_socket")]
    pub socket: String,

    /// Timeout for outbound calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to the hex-encoded ed25519 operator secret.
    #[serde(default = "default_key_path")]
    pub key_path: String,

    /// Capacity of the task event channel between transport and run loop.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Stop the operator after this many signing failures in a row.
    /// Unset means never.
    #[serde(default)]
    pub max_consecutive_signing_failures: Option<u32>,

    /// Log level used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Resubscription policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[retry]` section: how the subscription manager re-establishes a failed
/// subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of the backoff added or removed at random (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Give up after this many failed attempts. Unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// A resubscribed transport that stays up this long counts as healthy
    /// and resets the attempt count.
    #[serde(default = "default_healthy_after_ms")]
    pub healthy_after_ms: u64,
}

fn default_eth_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_task_created_signature() -> String {
    "NewTaskCreated(uint64,(uint16,bytes,bytes,bytes,uint32,uint8))".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_socket() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_key_path() -> String {
    "~/.aligned/operator.key".to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

fn default_healthy_after_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: None,
            healthy_after_ms: default_healthy_after_ms(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            eth_rpc_url: default_eth_rpc_url(),
            service_manager_address: Address::ZERO,
            task_created_signature: default_task_created_signature(),
            poll_interval_ms: default_poll_interval_ms(),
            aggregator_url: None,
            operator_address: Address::ZERO,
            operator_id: B256::ZERO,
            socket: default_socket(),
            timeout_secs: default_timeout_secs(),
            key_path: default_key_path(),
            event_buffer: default_event_buffer(),
            max_consecutive_signing_failures: None,
            log_level: default_log_level(),
            retry: RetryConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, OperatorError> {
        let contents = fs::read_to_string(expand_tilde(path))
            .map_err(|e| OperatorError::Config(format!("{}: {}", path, e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, OperatorError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| OperatorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), OperatorError> {
        if self.poll_interval_ms == 0 {
            return Err(OperatorError::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(OperatorError::Config(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(OperatorError::Config(format!(
                "retry.jitter must be between 0.0 and 1.0, got {}",
                self.retry.jitter
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read the operator key and assemble the complete identity.
    ///
    /// Fails if the key file is missing or malformed; there is no
    /// placeholder identity.
    pub fn load_identity(&self) -> Result<OperatorIdentity, OperatorError> {
        let key_path = expand_tilde(&self.key_path);
        let secret_hex = fs::read_to_string(&key_path)
            .map_err(|e| OperatorError::Config(format!("Operator key {}: {}", key_path, e)))?;
        let signer = Ed25519Signer::from_hex(&secret_hex)
            .map_err(|e| OperatorError::Config(format!("Operator key {}: {}", key_path, e)))?;

        Ok(OperatorIdentity::new(
            self.operator_address,
            self.operator_id,
            self.socket.clone(),
            self.timeout(),
            Arc::new(signer),
        ))
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
