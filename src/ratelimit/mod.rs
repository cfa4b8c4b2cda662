//! Rate limiting logic and state management.

mod backend;
mod clock;
mod evaluator;
mod limiter;
mod log;
mod resolver;
mod rules;

pub use backend::{LocalBackend, LogBackend, SharedBackend, DEFAULT_DATABASE_NAME};
pub use clock::{Clock, MockClock, SystemClock};
pub use evaluator::{evaluate, Decision};
pub use limiter::{Limit, Limiter, LimiterBuilder};
pub use log::InvocationLog;
pub use resolver::{resolve, LimitParams, Param, Resolution};
pub use rules::{Period, Rule, RuleSet};
