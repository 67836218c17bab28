//! The one place a model is actually called

use crate::accounting::{CostTracker, RateLimiter};
use crate::error::Result;
use crate::ingestion::count_tokens;
use crate::types::{OperationKind, UsageRecord};

use super::provider::CompletionProvider;
use super::retry::RetryPolicy;

/// Provider plus the model name and retry policy applied to every call
pub struct ModelCaller<'a> {
    provider: &'a dyn CompletionProvider,
    model: String,
    policy: RetryPolicy,
}

impl<'a> ModelCaller<'a> {
    pub fn new(provider: &'a dyn CompletionProvider, model: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            model: model.into(),
            policy,
        }
    }

    /// Send a prompt with pacing, retries and usage accounting
    ///
    /// The limiter is consulted before every attempt. Transient failures are
    /// retried with backoff up to the policy's attempt limit; permanent ones
    /// are returned at once. Only the successful attempt is recorded.
    pub async fn call(
        &self,
        operation: OperationKind,
        prompt: &str,
        limiter: &mut RateLimiter,
        tracker: &mut CostTracker,
    ) -> Result<String> {
        let input_tokens = count_tokens(prompt);
        let mut attempt = 1;

        loop {
            limiter.acquire(input_tokens).await;

            match self.provider.complete(prompt).await {
                Ok(response) => {
                    let output_tokens = count_tokens(&response);
                    tracker.record(UsageRecord::new(
                        operation,
                        self.model.clone(),
                        input_tokens,
                        output_tokens,
                    ));
                    tracing::debug!(
                        "{} call to {} used {} input / {} output tokens",
                        operation,
                        self.provider.backend().name(),
                        input_tokens,
                        output_tokens
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        "{} call failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        self.policy.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
