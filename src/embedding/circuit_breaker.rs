use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{EmbeddingProvider, TokenEmbeddings};
use crate::error::ProviderError;

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before letting a single trial request through
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing fast
    HalfOpen, // One trial request decides recovery
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// Set while the half-open trial request is outstanding
    trial_started_at: Option<Instant>,
}

/// Fails fast while the wrapped provider keeps failing, so a dead embedding
/// backend costs one timeout per `recovery_timeout` instead of one per pair.
pub struct CircuitBreakingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    config: CircuitBreakerConfig,
    breaker: Mutex<BreakerInner>,
}

impl CircuitBreakingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            config,
            breaker: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_started_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock("state read").state
    }

    fn lock(&self, operation: &str) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.breaker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Circuit breaker mutex was poisoned during {}, recovering", operation);
                poisoned.into_inner()
            }
        }
    }

    /// Check if the circuit should allow a request.
    ///
    /// While half-open only one trial request is admitted. A trial whose
    /// caller was cancelled never reports back, so it is replaced once it
    /// has been outstanding for a full `recovery_timeout`.
    fn should_allow_request(&self) -> bool {
        let mut inner = self.lock("admission");

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => match inner.trial_started_at {
                Some(started) if started.elapsed() < self.config.recovery_timeout => false,
                _ => {
                    inner.trial_started_at = Some(Instant::now());
                    true
                }
            },
            CircuitState::Open => match inner.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.config.recovery_timeout => {
                    info!(
                        "Circuit breaker for {} transitioning from Open to HalfOpen for recovery test",
                        self.inner.model_id()
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started_at = Some(Instant::now());
                    true
                }
                _ => false,
            },
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock("success recording");
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker for {} closing after successful trial request", self.inner.model_id());
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.trial_started_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.lock("failure recording");
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Instant::now());
        inner.trial_started_at = None;

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker for {} opening after {} consecutive failures",
                        self.inner.model_id(),
                        inner.failure_count
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker for {} opening again after failure during recovery test",
                    self.inner.model_id()
                );
                inner.state = CircuitState::Open;
            }
            CircuitState::Open => {}
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CircuitBreakingProvider {
    async fn embed(&self, text: &str) -> Result<TokenEmbeddings, ProviderError> {
        if !self.should_allow_request() {
            return Err(ProviderError::CircuitOpen {
                provider: self.inner.model_id().to_string(),
                failures: self.lock("rejection").failure_count,
            });
        }

        match self.inner.embed(text).await {
            Ok(embeddings) => {
                self.record_success();
                Ok(embeddings)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner.dimensions()
    }
}
