//! Call Limiter - sliding-window rate limiting for arbitrary calls
//!
//! This crate decides whether the next call for a key is admitted under one or
//! more `count/period` rules, recording admitted calls in a per-key invocation
//! log. The log lives in process memory or in a shared store so that several
//! processes can throttle against the same history.
//!
//! ```
//! use call_limiter::Limiter;
//!
//! let limiter = Limiter::new();
//! let limit = limiter.limit().limitations("3/minute").key("client-42");
//!
//! for _ in 0..3 {
//!     assert!(limit.call(|| "work").is_ok());
//! }
//! assert!(limit.call(|| "work").unwrap_err().is_rate_limited());
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use config::LimiterConfig;
pub use error::{LimiterError, Result, RuleError};
pub use ratelimit::{Limit, Limiter, LimiterBuilder, Param};
pub use store::{FileSharedLog, MemorySharedLog, SharedLog};
