//! Error types for the call limiter.

use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// The call was denied because a rate rule is exhausted for its key.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by a shared log store
    #[error("Shared log error: {0}")]
    Store(String),

    /// The shared log document could not be parsed after construction
    #[error("Corrupt invocation log document '{database}': {source}")]
    CorruptLog {
        /// Identifier of the document in the shared store
        database: String,
        /// Underlying parse failure
        #[source]
        source: serde_json::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Returns `true` if this error is the rate limit denial signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LimiterError::RateLimitExceeded)
    }
}

/// Errors produced while parsing a rule string.
///
/// The limiter never surfaces these to callers; an unparsable rule string means
/// the call is not throttled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// The rule string contained no rules
    #[error("rule string is empty")]
    Empty,

    /// A rule did not follow `<count>/<period>`
    #[error("rule {index} ('{rule}') is not of the form <count>/<period>")]
    Malformed { index: usize, rule: String },

    /// A rule named a period that is not recognized
    #[error("rule {index} has unknown period '{period}'")]
    UnknownPeriod { index: usize, period: String },

    /// A rule allowed zero calls
    #[error("rule {index} has a non-positive count")]
    NonPositiveCount { index: usize },

    /// A rule used a zero period multiplier
    #[error("rule {index} has a zero period multiplier")]
    ZeroMultiplier { index: usize },
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
