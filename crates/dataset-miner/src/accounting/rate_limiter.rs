//! Pacing for outbound model calls

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::RateLimits;

const WINDOW: Duration = Duration::from_secs(60);

/// Minimum-interval limiter with optional rolling one-minute budgets
///
/// Owned by the pipeline and borrowed mutably for each call, so there is a
/// single caller and no locking.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    requests_per_minute: Option<u32>,
    tokens_per_minute: Option<u32>,
    last_call: Option<Instant>,
    /// Calls inside the current window with their token estimates
    window: VecDeque<(Instant, usize)>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            min_interval: limits.min_interval,
            requests_per_minute: limits.requests_per_minute,
            tokens_per_minute: limits.tokens_per_minute,
            last_call: None,
            window: VecDeque::new(),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(RateLimits {
            min_interval: Duration::ZERO,
            requests_per_minute: None,
            tokens_per_minute: None,
        })
    }

    /// Wait until a call costing `tokens` may start, then record it
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&mut self, tokens: usize) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            let now = Instant::now();
            self.evict(now);

            let wait = self.required_wait(now, tokens);
            if wait.is_zero() {
                break;
            }

            tracing::debug!("Rate limit reached, waiting {:.2}s", wait.as_secs_f64());
            sleep(wait).await;
            waited += wait;
        }

        let now = Instant::now();
        self.last_call = Some(now);
        if self.requests_per_minute.is_some() || self.tokens_per_minute.is_some() {
            self.window.push_back((now, tokens));
        }
        waited
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.window.front() {
            if now.duration_since(at) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn required_wait(&self, now: Instant, tokens: usize) -> Duration {
        let until = |at: Instant| (at + WINDOW).saturating_duration_since(now);
        let mut wait = Duration::ZERO;

        if let Some(last) = self.last_call {
            wait = wait.max((last + self.min_interval).saturating_duration_since(now));
        }

        if let Some(limit) = self.requests_per_minute {
            if self.window.len() >= limit as usize {
                let excess = self.window.len() + 1 - limit as usize;
                if let Some(&(at, _)) = self.window.get(excess - 1) {
                    wait = wait.max(until(at));
                }
            }
        }

        if let Some(limit) = self.tokens_per_minute {
            let limit = limit as usize;
            let mut used: usize = self.window.iter().map(|(_, n)| n).sum();
            if used + tokens > limit {
                // Wait for the oldest calls to age out until the new one fits,
                // or until the window is empty for an oversized request
                for &(at, n) in &self.window {
                    used -= n;
                    wait = wait.max(until(at));
                    if used + tokens <= limit {
                        break;
                    }
                }
            }
        }

        wait
    }
}
