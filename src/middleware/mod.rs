//! HTTP middleware: request logging and rate limiting.

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{
    effective_limit, rate_limit_middleware, RateLimitState, RateLimitTable, RateLimiter,
    RatePolicy,
};
