// crates/aligned-operator/tests/run_loop.rs
//
// Integration tests for the operator run loop.
//
// Drives Operator::start against an in-memory subscriber that can emit task
// events, break the current subscription, and fail subscribe calls on
// demand. Signed responses are read off the delivery channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use aligned_core::{
    abi, crypto, verify_signature, Ed25519Signer, OperatorIdentity, SignedTaskResponse,
    TaskCreatedEvent, TaskResponse, TaskSigner,
};
use aligned_operator::{
    Operator, OperatorError, RetryPolicy, Subscription, SubscriptionError, TaskSubscriber,
};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// In-memory task source. Subscribe calls succeed unless the script says
/// otherwise; the most recent live subscription can be fed or broken.
#[derive(Default)]
struct MockSubscriber {
    outcomes: Mutex<VecDeque<bool>>,
    calls: AtomicU32,
    live: Mutex<Option<LiveSubscription>>,
}

struct LiveSubscription {
    sink: mpsc::Sender<TaskCreatedEvent>,
    errors: mpsc::Sender<SubscriptionError>,
    cancel: CancellationToken,
}

impl MockSubscriber {
    fn new(outcomes: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            ..Self::default()
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait_for_calls(&self, n: u32) {
        tokio::time::timeout(WAIT, async {
            while self.calls() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscribe was not called in time");
    }

    async fn emit(&self, task_index: u64) {
        let sink = self.live.lock().unwrap().as_ref().unwrap().sink.clone();
        sink.send(TaskCreatedEvent::with_index(task_index))
            .await
            .unwrap();
    }

    async fn break_subscription(&self, reason: &str) {
        let errors = self.live.lock().unwrap().as_ref().unwrap().errors.clone();
        errors
            .send(SubscriptionError::Transport(reason.to_string()))
            .await
            .unwrap();
    }

    fn live_token(&self) -> CancellationToken {
        self.live.lock().unwrap().as_ref().unwrap().cancel.clone()
    }
}

#[async_trait]
impl TaskSubscriber for MockSubscriber {
    async fn subscribe(
        &self,
        sink: mpsc::Sender<TaskCreatedEvent>,
        cancel: CancellationToken,
    ) -> Result<Subscription, SubscriptionError> {
        let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if !ok {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(SubscriptionError::Transport("connection refused".into()));
        }

        let (errors, error_rx) = mpsc::channel(1);
        *self.live.lock().unwrap() = Some(LiveSubscription {
            sink,
            errors,
            cancel: cancel.clone(),
        });
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Subscription::new(error_rx, cancel))
    }
}

/// Transport whose subscribe call always succeeds but whose error path fires
/// straight away, like a poller pointed at a node that is down.
#[derive(Default)]
struct DeadNodeSubscriber {
    calls: AtomicU32,
}

#[async_trait]
impl TaskSubscriber for DeadNodeSubscriber {
    async fn subscribe(
        &self,
        _sink: mpsc::Sender<TaskCreatedEvent>,
        cancel: CancellationToken,
    ) -> Result<Subscription, SubscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (errors, error_rx) = mpsc::channel(1);
        errors
            .try_send(SubscriptionError::Transport("connection refused".into()))
            .unwrap();
        Ok(Subscription::new(error_rx, cancel))
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(2),
        max_backoff: Duration::from_millis(10),
        multiplier: 2.0,
        jitter: 0.0,
        max_attempts: None,
        healthy_after: Duration::from_secs(60),
    }
}

fn identity(signer: Arc<dyn TaskSigner>) -> OperatorIdentity {
    OperatorIdentity::new(
        Address::repeat_byte(0xaa),
        B256::repeat_byte(0x07),
        "127.0.0.1:9090",
        Duration::from_secs(1),
        signer,
    )
}

struct Harness {
    subscriber: Arc<MockSubscriber>,
    signer: Arc<Ed25519Signer>,
    shutdown: CancellationToken,
    responses: mpsc::UnboundedReceiver<SignedTaskResponse>,
    handle: JoinHandle<Result<(), OperatorError>>,
}

impl Harness {
    async fn start(outcomes: &[bool], policy: RetryPolicy) -> Self {
        let subscriber = MockSubscriber::new(outcomes);
        let signer = Arc::new(Ed25519Signer::from_secret(&[9u8; 32]));
        let shutdown = CancellationToken::new();
        let (tx, responses) = mpsc::unbounded_channel();

        let operator = Operator::new(identity(signer.clone()), subscriber.clone(), tx)
            .with_retry_policy(policy);
        let handle = tokio::spawn(operator.start(shutdown.clone()));
        subscriber.wait_for_calls(1).await;

        Self {
            subscriber,
            signer,
            shutdown,
            responses,
            handle,
        }
    }

    async fn next_response(&mut self) -> SignedTaskResponse {
        tokio::time::timeout(WAIT, self.responses.recv())
            .await
            .expect("no response in time")
            .expect("delivery channel closed")
    }

    async fn stop(self) -> Result<(), OperatorError> {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("operator did not stop in time")
            .expect("operator task panicked")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tasks_are_signed_in_arrival_order() {
    let mut h = Harness::start(&[], fast_policy()).await;

    h.subscriber.emit(3).await;
    h.subscriber.emit(4).await;

    let first = h.next_response().await;
    let second = h.next_response().await;
    assert_eq!(first.task_index(), 3);
    assert_eq!(second.task_index(), 4);

    h.stop().await.unwrap();
}

#[tokio::test]
async fn test_response_matches_encoding_and_signature() {
    let mut h = Harness::start(&[], fast_policy()).await;

    h.subscriber.emit(7).await;
    let signed = h.next_response().await;

    let expected = abi::encode(&TaskResponse::new(7, true)).unwrap();
    assert_eq!(signed.encoded, expected);
    assert_eq!(signed.digest, crypto::digest(&expected));
    assert_eq!(
        hex::encode(signed.digest),
        "dc686ec4a0ff239c70e7c7c36e8f853eced3bc8618f48d2b816da2a74311237e"
    );
    assert_eq!(signed.operator_id, B256::repeat_byte(0x07));
    assert!(verify_signature(
        &h.signer.public_key(),
        signed.digest.as_slice(),
        signed.signature.as_bytes()
    )
    .unwrap());

    h.stop().await.unwrap();
}

#[tokio::test]
async fn test_tasks_after_subscription_error_are_processed() {
    let mut h = Harness::start(&[], fast_policy()).await;
    let first_token = h.subscriber.live_token();

    h.subscriber.break_subscription("websocket closed").await;
    h.subscriber.wait_for_calls(2).await;
    assert!(first_token.is_cancelled());

    h.subscriber.emit(10).await;
    assert_eq!(h.next_response().await.task_index(), 10);

    h.stop().await.unwrap();
}

#[tokio::test]
async fn test_recovers_after_failed_resubscribe_attempts() {
    let mut h = Harness::start(&[true, false, false, true], fast_policy()).await;

    h.subscriber.break_subscription("node restarted").await;
    h.subscriber.wait_for_calls(4).await;

    h.subscriber.emit(5).await;
    assert_eq!(h.next_response().await.task_index(), 5);

    h.stop().await.unwrap();
}

#[tokio::test]
async fn test_gives_up_when_retry_policy_is_exhausted() {
    let h = Harness::start(&[true, false, false], fast_policy().with_max_attempts(2)).await;

    h.subscriber.break_subscription("node gone").await;
    let result = tokio::time::timeout(WAIT, h.handle)
        .await
        .expect("operator did not stop in time")
        .expect("operator task panicked");

    assert!(matches!(
        result,
        Err(OperatorError::ResubscribeExhausted { attempts: 2 })
    ));
    assert_eq!(h.subscriber.calls(), 3);
}

#[tokio::test]
async fn test_shutdown_while_idle_emits_nothing() {
    let mut h = Harness::start(&[], fast_policy()).await;
    let token = h.subscriber.live_token();

    let shutdown = h.shutdown.clone();
    shutdown.cancel();
    let result = tokio::time::timeout(WAIT, &mut h.handle)
        .await
        .expect("operator did not stop in time")
        .expect("operator task panicked");

    assert!(result.is_ok());
    assert!(token.is_cancelled());
    assert!(h.responses.recv().await.is_none());
}

#[tokio::test]
async fn test_shutdown_during_backoff_returns_ok() {
    let slow = RetryPolicy {
        initial_backoff: Duration::from_secs(60),
        max_backoff: Duration::from_secs(60),
        ..fast_policy()
    };
    let h = Harness::start(&[true, false], slow).await;

    h.subscriber.break_subscription("node gone").await;
    h.subscriber.wait_for_calls(2).await;

    assert!(h.stop().await.is_ok());
}

#[tokio::test]
async fn test_transport_failing_on_open_is_bounded_by_retry_policy() {
    let subscriber = Arc::new(DeadNodeSubscriber::default());
    let (tx, _responses) = mpsc::unbounded_channel();
    let operator = Operator::new(
        identity(Arc::new(Ed25519Signer::generate())),
        subscriber.clone(),
        tx,
    )
    .with_retry_policy(fast_policy().with_max_attempts(3));

    let result = tokio::time::timeout(WAIT, operator.start(CancellationToken::new()))
        .await
        .expect("operator did not give up in time");

    assert!(matches!(
        result,
        Err(OperatorError::ResubscribeExhausted { attempts: 3 })
    ));
    assert_eq!(subscriber.calls.load(Ordering::SeqCst), 4);
}
