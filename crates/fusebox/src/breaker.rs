//! The circuit breaker.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     a failure brings the streak to failure_threshold
//! Open     → HalfOpen: cooldown elapses (timer task)
//! HalfOpen → Closed:   a probe succeeds
//! HalfOpen → Open:     a failure brings the streak to half_open_trial_limit
//! ```

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{CircuitBreakerConfig, ConfigError};
use crate::error::BreakerError;
use crate::state::{CircuitState, StateCell};

/// Circuit breaker guarding a fallible, possibly async action.
///
/// One instance protects one dependency and is shared by every caller,
/// usually behind an `Arc`.
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

struct Shared {
    config: CircuitBreakerConfig,

    /// Current state, written only under the write lock
    cell: RwLock<StateCell>,

    /// Consecutive failures in the current closed or half-open phase
    failures: AtomicU32,

    /// Cooldown task for the latest open period, keyed by its epoch
    timer: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Start building a circuit breaker from the default configuration.
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    fn from_valid(config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                cell: RwLock::new(StateCell::closed()),
                failures: AtomicU32::new(0),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Run `action` unless the circuit is open.
    ///
    /// - Closed: the action runs. Its errors come back as
    ///   [`BreakerError::Action`] until `failure_threshold` consecutive
    ///   failures open the circuit.
    /// - Open: [`BreakerError::Open`] is returned and the action is not run.
    /// - Half-open: the action runs as a recovery probe. Success closes the
    ///   circuit; failure comes back as [`BreakerError::HalfOpen`], and
    ///   `half_open_trial_limit` consecutive failures reopen it.
    ///
    /// The breaker never retries and puts no timeout on the action. Wrap the
    /// action in `tokio::time::timeout` if it needs a deadline.
    pub async fn guard<F, Fut, T, E>(&self, action: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let config = &self.shared.config;

        match self.shared.observe() {
            CircuitState::Closed => self.attempt(config.failure_threshold, action).await,
            CircuitState::Open => {
                tracing::debug!("Circuit open, rejecting call");
                Err(self.open_error())
            }
            CircuitState::HalfOpen => {
                let trial_limit = config.half_open_trial_limit;
                match self.attempt(trial_limit, action).await {
                    Ok(value) => {
                        self.shared.close("probe succeeded");
                        Ok(value)
                    }
                    Err(BreakerError::Action(source)) => Err(BreakerError::HalfOpen {
                        trial_limit,
                        cooldown: config.cooldown,
                        source,
                    }),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Run the action if the failure streak is below `threshold`.
    async fn attempt<F, Fut, T, E>(&self, threshold: u32, action: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let failures = self.shared.failures.load(Ordering::SeqCst);
        if failures >= threshold {
            self.trip(failures);
            return Err(self.open_error());
        }

        match action().await {
            Ok(value) => {
                self.shared.failures.store(0, Ordering::SeqCst);
                Ok(value)
            }
            Err(e) => {
                let failures = self.shared.failures.fetch_add(1, Ordering::SeqCst) + 1;
                // Exactly one concurrent failure lands on the threshold
                if failures == threshold {
                    self.trip(failures);
                }
                Err(BreakerError::Action(e))
            }
        }
    }

    /// Open the circuit and arm its cooldown timer.
    fn trip(&self, failures: u32) {
        let (from, epoch) = {
            let mut cell = self.shared.cell.write();
            if cell.state == CircuitState::Open {
                return;
            }
            let from = cell.state;
            let epoch = cell.open(Instant::now());
            self.shared.failures.store(0, Ordering::SeqCst);
            (from, epoch)
        };

        tracing::warn!(
            from = %from,
            failures,
            cooldown = ?self.shared.config.cooldown,
            "Circuit opened after repeated failures"
        );

        self.arm_cooldown(epoch);
    }

    /// Spawn the task that half-opens the circuit once the cooldown elapses.
    ///
    /// The caller does not wait for it. Without a Tokio runtime no task is
    /// spawned and the elapsed cooldown is picked up by the next state read.
    fn arm_cooldown(&self, epoch: u64) {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!(epoch, "No Tokio runtime, cooldown will be checked on the next call");
            return;
        };

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let cooldown = self.shared.config.cooldown;
        let task = handle.spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Some(shared) = shared.upgrade() {
                shared.half_open(epoch);
            }
        });

        let mut timer = self.shared.timer.lock();
        // A newer open period may already own the slot
        if matches!(timer.as_ref(), Some((armed, _)) if *armed > epoch) {
            task.abort();
            return;
        }
        if let Some((_, previous)) = timer.replace((epoch, task)) {
            previous.abort();
        }
    }

    fn open_error<E>(&self) -> BreakerError<E> {
        BreakerError::Open {
            failure_threshold: self.shared.config.failure_threshold,
            cooldown: self.shared.config.cooldown,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.shared.observe()
    }

    /// Get the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Force the circuit closed and forget the failure streak.
    pub fn reset(&self) {
        self.shared.close("manual reset");
    }
}

impl Shared {
    /// Read the state, applying an elapsed cooldown the timer has not.
    fn observe(&self) -> CircuitState {
        let (state, expired) = {
            let cell = self.cell.read();
            (cell.state, cell.expired(self.config.cooldown, Instant::now()))
        };

        match expired {
            Some(epoch) => {
                self.half_open(epoch);
                self.cell.read().state
            }
            None => state,
        }
    }

    fn half_open(&self, epoch: u64) {
        let mut cell = self.cell.write();
        if cell.half_open(epoch) {
            self.failures.store(0, Ordering::SeqCst);
            drop(cell);
            tracing::info!(epoch, "Circuit half-open, probing for recovery");
        }
    }

    fn close(&self, reason: &'static str) {
        let from = {
            let mut cell = self.cell.write();
            let from = cell.state;
            cell.close();
            self.failures.store(0, Ordering::SeqCst);
            from
        };

        if let Some((_, timer)) = self.timer.lock().take() {
            timer.abort();
        }

        if from != CircuitState::Closed {
            tracing::info!(from = %from, reason, "Circuit closed");
        }
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        if let Some((_, timer)) = self.shared.timer.lock().take() {
            timer.abort();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_valid(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Builder for CircuitBreaker.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set consecutive failures tolerated while closed.
    pub fn failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.config.failure_threshold = failure_threshold;
        self
    }

    /// Set consecutive failures tolerated while half-open.
    pub fn half_open_trial_limit(mut self, half_open_trial_limit: u32) -> Self {
        self.config.half_open_trial_limit = half_open_trial_limit;
        self
    }

    /// Set how long the circuit stays open before probing.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Build the circuit breaker.
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        CircuitBreaker::new(self.config)
    }
}
