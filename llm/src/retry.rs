//! Bounded retries with exponential backoff for model calls.
//!
//! Every attempt runs under a per-call deadline. Transient failures
//! (timeouts, connection errors, 5xx, rate limits) are retried; anything
//! else is returned immediately. Exhausting the attempts yields
//! [`LlmError::ServiceUnavailable`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Embedding;
use crate::error::{LlmError, Result};
use crate::provider::{EmbeddingProvider, GenerationConfig, LanguageModel};

/// How often and how patiently to retry a model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Deadline for one attempt, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            call_timeout_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay after the given failed attempt (1-based): the initial backoff,
    /// doubled for every further attempt and capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms.max(self.initial_backoff_ms)))
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let timeout = self.call_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{operation} succeeded on attempt {attempt}/{attempts}");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    warn!("{operation} failed after {attempts} attempts: {e}");
                    return Err(LlmError::ServiceUnavailable {
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = match &e {
                        LlmError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs)
                                .min(Duration::from_millis(self.max_backoff_ms))
                        }
                        _ => self.delay_for_attempt(attempt),
                    };
                    warn!("{operation} attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Wraps a model or embedding provider with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingModel<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M> RetryingModel<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for RetryingModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        self.policy
            .run("generate", || self.inner.generate(prompt, context, config))
            .await
    }
}

#[async_trait]
impl<M: EmbeddingProvider> EmbeddingProvider for RetryingModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.policy.run("embed", || self.inner.embed(text)).await
    }
}
