//! Cost accounting and call pacing

mod cost;
mod rate_limiter;

pub use cost::{CostSummary, CostTracker, OperationCost, PriceTable};
pub use rate_limiter::RateLimiter;
