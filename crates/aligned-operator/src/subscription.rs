// crates/aligned-operator/src/subscription.rs
//
// Lifecycle of the task-creation event subscription.
//
// The manager owns one long-lived event channel. Every subscription it opens
// writes into a clone of the same sender, so the run loop keeps reading from
// one receiver no matter how many times the transport is replaced.
//
// States:
//   Subscribed { subscription, since } -- error path fires -->
//     healthy   -> resubscribe now (attempt 1)
//     unhealthy -> Resubscribing { attempt, retry_at }
//   Resubscribing -- deadline --> attempt + 1
//     ok   -> Subscribed (still unhealthy)
//     fail -> Resubscribing { attempt + 1, retry_at }
//
// A subscription is healthy once it has delivered an event or stayed up for
// `healthy_after`. Until then a failure on its error path counts against the
// retry policy exactly like a failed subscribe call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use aligned_core::TaskCreatedEvent;

use crate::config::RetryConfig;
use crate::error::{OperatorError, SubscriptionError};

/// A live feed of task events from a transport.
///
/// Events go to the sink passed to [`TaskSubscriber::subscribe`]; this handle
/// carries the error/termination path and the token that releases the
/// transport's resources.
pub struct Subscription {
    errors: mpsc::Receiver<SubscriptionError>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(errors: mpsc::Receiver<SubscriptionError>, cancel: CancellationToken) -> Self {
        Self { errors, cancel }
    }

    /// Wait for the transport to report a failure. A closed error path is
    /// reported as [`SubscriptionError::Closed`].
    pub async fn next_error(&mut self) -> SubscriptionError {
        self.errors.recv().await.unwrap_or(SubscriptionError::Closed)
    }

    /// Ask the transport to release this subscription. Best-effort and
    /// idempotent.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A source of `NewTaskCreated` events.
///
/// `subscribe` may be called any number of times over the life of the
/// process. Implementations must stop producing into `sink` once `cancel`
/// fires.
#[async_trait]
pub trait TaskSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        sink: mpsc::Sender<TaskCreatedEvent>,
        cancel: CancellationToken,
    ) -> Result<Subscription, SubscriptionError>;
}

/// How the manager paces resubscription attempts after a failure.
///
/// The first attempt after a failure is immediate. If it fails, attempt `n`
/// waits `initial_backoff * multiplier^(n - 1)`, capped at `max_backoff`,
/// then scaled by a random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    /// Failed attempts tolerated before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Uptime after which a resubscribed transport counts as healthy and the
    /// failure count starts over.
    pub healthy_after: Duration,
}

impl RetryPolicy {
    /// Retry forever with no delay between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
            healthy_after: Duration::from_secs(10),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the attempt that follows failed attempt `attempt`,
    /// without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay before the next attempt, with jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        base.mul_f64(factor)
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows_retry_after(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
            max_attempts: config.max_attempts,
            healthy_after: Duration::from_millis(config.healthy_after_ms),
        }
    }
}

/// What woke the manager up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionSignal {
    /// The current subscription's error path fired.
    Failed(SubscriptionError),
    /// A scheduled resubscription attempt is due.
    RetryDue,
}

enum State {
    Subscribed {
        subscription: Subscription,
        since: Instant,
    },
    Resubscribing {
        attempt: u32,
        retry_at: Instant,
    },
}

/// Owns the current subscription and replaces it when it fails.
pub struct SubscriptionManager {
    subscriber: Arc<dyn TaskSubscriber>,
    policy: RetryPolicy,
    sink: mpsc::Sender<TaskCreatedEvent>,
    shutdown: CancellationToken,
    state: State,
    /// Attempt that opened the current subscription; 0 once it is healthy.
    attempt: u32,
    resubscriptions: u64,
}

impl SubscriptionManager {
    /// Open the first subscription and return the manager together with the
    /// receiver the run loop reads events from.
    ///
    /// Failure here is fatal: there is no retry for the initial subscribe.
    pub async fn establish(
        subscriber: Arc<dyn TaskSubscriber>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
        buffer: usize,
    ) -> Result<(Self, mpsc::Receiver<TaskCreatedEvent>), OperatorError> {
        let (sink, events) = mpsc::channel(buffer.max(1));

        let subscription = subscriber
            .subscribe(sink.clone(), shutdown.child_token())
            .await
            .map_err(OperatorError::Subscribe)?;
        tracing::info!("Subscribed to new tasks");

        let manager = Self {
            subscriber,
            policy,
            sink,
            shutdown,
            state: State::Subscribed {
                subscription,
                since: Instant::now(),
            },
            attempt: 0,
            resubscriptions: 0,
        };
        Ok((manager, events))
    }

    /// Wait for the next thing the manager must act on.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to the event channel.
    pub async fn signal(&mut self) -> SubscriptionSignal {
        match &mut self.state {
            State::Subscribed { subscription, .. } => {
                SubscriptionSignal::Failed(subscription.next_error().await)
            }
            State::Resubscribing { retry_at, .. } => {
                tokio::time::sleep_until(*retry_at).await;
                SubscriptionSignal::RetryDue
            }
        }
    }

    /// Record that the current subscription delivered an event, which
    /// proves it healthy and clears the failure count.
    pub fn mark_healthy(&mut self) {
        if self.attempt != 0 && matches!(self.state, State::Subscribed { .. }) {
            tracing::debug!("Task subscription healthy after attempt {}", self.attempt);
            self.attempt = 0;
        }
    }

    /// React to a signal returned by [`Self::signal`].
    ///
    /// Returns an error only when the retry policy is exhausted.
    pub async fn on_signal(&mut self, signal: SubscriptionSignal) -> Result<(), OperatorError> {
        match signal {
            SubscriptionSignal::Failed(err) => {
                tracing::warn!("Error in task subscription: {}", err);
                let since = match &self.state {
                    State::Subscribed {
                        subscription,
                        since,
                    } => {
                        subscription.unsubscribe();
                        *since
                    }
                    State::Resubscribing { .. } => return Ok(()),
                };

                if since.elapsed() >= self.policy.healthy_after {
                    self.attempt = 0;
                }
                if self.attempt == 0 {
                    return self.try_resubscribe(1).await;
                }
                // The subscription opened by this attempt never became healthy.
                self.schedule_retry(self.attempt)
            }
            SubscriptionSignal::RetryDue => match self.state {
                State::Resubscribing { attempt, .. } => self.try_resubscribe(attempt + 1).await,
                State::Subscribed { .. } => Ok(()),
            },
        }
    }

    async fn try_resubscribe(&mut self, attempt: u32) -> Result<(), OperatorError> {
        let cancel = self.shutdown.child_token();
        let result = tokio::select! {
            result = self.subscriber.subscribe(self.sink.clone(), cancel) => result,
            _ = self.shutdown.cancelled() => return Ok(()),
        };

        match result {
            Ok(subscription) => {
                self.resubscriptions += 1;
                self.attempt = attempt;
                tracing::info!("Resubscribed to new tasks (attempt {})", attempt);
                self.state = State::Subscribed {
                    subscription,
                    since: Instant::now(),
                };
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Resubscribe attempt {} failed: {}", attempt, err);
                self.schedule_retry(attempt)
            }
        }
    }

    /// Attempt `attempt` failed: wait out the backoff, or give up if the
    /// policy allows no more attempts.
    fn schedule_retry(&mut self, attempt: u32) -> Result<(), OperatorError> {
        if !self.policy.allows_retry_after(attempt) {
            tracing::error!("Giving up on task subscription after {} attempts", attempt);
            return Err(OperatorError::ResubscribeExhausted { attempts: attempt });
        }
        let delay = self.policy.delay(attempt);
        tracing::debug!("Next resubscribe attempt in {:?}", delay);
        self.state = State::Resubscribing {
            attempt,
            retry_at: Instant::now() + delay,
        };
        Ok(())
    }

    /// Cancel the current subscription. Used on shutdown.
    pub fn close(&mut self) {
        if let State::Subscribed { subscription, .. } = &self.state {
            subscription.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.state, State::Subscribed { .. })
    }

    /// Number of successful re-establishments since [`Self::establish`].
    pub fn resubscriptions(&self) -> u64 {
        self.resubscriptions
    }
}
