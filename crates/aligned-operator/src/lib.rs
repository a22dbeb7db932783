// crates/aligned-operator/src/lib.rs
//
// Operator daemon library: task subscription with automatic recovery, the
// signing run loop, and response delivery. The binary in main.rs wires these
// together from a TOML config.

pub mod chain;
pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod operator;
pub mod subscription;

pub use chain::{ChainClient, EthRpc, RpcLog, RpcTaskSubscriber};
pub use config::{OperatorConfig, RetryConfig};
pub use delivery::{run_delivery_loop, AggregatorClient, LogSender, SignedResponsePayload};
pub use error::{OperatorError, SubscriptionError};
pub use operator::{Operator, DEFAULT_EVENT_BUFFER};
pub use subscription::{
    RetryPolicy, Subscription, SubscriptionManager, SubscriptionSignal, TaskSubscriber,
};
