// crates/aligned-operator/src/main.rs
//
// Binary entrypoint for the operator daemon.
//
// Loads configuration, initializes tracing, loads the signing key, then runs
// the operator until Ctrl-C. Signed responses are posted to the aggregator
// when one is configured and logged otherwise.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aligned_core::ResponseSender;
use aligned_operator::{
    run_delivery_loop, AggregatorClient, LogSender, Operator, OperatorConfig, OperatorError,
    RetryPolicy, RpcTaskSubscriber,
};

/// Operator daemon: signs a response for every task the service manager creates.
#[derive(Parser, Debug)]
#[command(name = "aligned-operator", version = "0.1.0", about = "Task-signing operator daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.aligned/operator.toml")]
    config: String,

    /// Override the Ethereum JSON-RPC endpoint from the config file.
    #[arg(long)]
    eth_rpc_url: Option<String>,

    /// Override the aggregator endpoint from the config file.
    #[arg(long)]
    aggregator_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Fall back to defaults if the file is missing; the outcome is logged
    // once tracing is up.
    let loaded = OperatorConfig::load(&args.config);
    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => OperatorConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", args.config),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            args.config,
            e
        ),
    }

    if let Some(url) = args.eth_rpc_url {
        config.eth_rpc_url = url;
    }
    if let Some(url) = args.aggregator_url {
        config.aggregator_url = Some(url);
    }

    tracing::info!("Aligned operator v0.1.0");
    tracing::info!("Ethereum RPC: {}", config.eth_rpc_url);
    tracing::info!("Service manager: {}", config.service_manager_address);

    let identity = config.load_identity()?;
    tracing::info!(
        "Operator {} using {} key 0x{}",
        identity.operator_id(),
        identity.signer().scheme(),
        hex::encode(identity.signer().public_key())
    );

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C");
        }
        ctrl_c_token.cancel();
    });

    let sender: Arc<dyn ResponseSender> = match &config.aggregator_url {
        Some(url) => {
            tracing::info!("Submitting responses to aggregator at {}", url);
            Arc::new(AggregatorClient::new(url.clone(), config.timeout()))
        }
        None => {
            tracing::warn!("No aggregator configured; signed responses will only be logged");
            Arc::new(LogSender)
        }
    };
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let delivery = tokio::spawn(run_delivery_loop(response_rx, sender));

    let subscriber = Arc::new(RpcTaskSubscriber::from_config(&config));
    let operator = Operator::new(identity, subscriber, response_tx)
        .with_retry_policy(RetryPolicy::from(&config.retry))
        .with_event_buffer(config.event_buffer)
        .with_signing_failure_limit(config.max_consecutive_signing_failures);

    let result = operator.start(shutdown).await;
    if let Err(e) = &result {
        tracing::error!("Operator stopped: {}", e);
    }

    // The operator owned the only sender, so the delivery loop drains and exits.
    let delivered = delivery
        .await
        .map_err(|e| OperatorError::Delivery(format!("delivery task failed: {}", e)));

    result?;
    delivered?;
    Ok(())
}
