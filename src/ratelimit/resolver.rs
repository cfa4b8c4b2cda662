//! Call-time resolution of keys, limitations and exemptions.

use std::fmt;
use std::sync::Arc;

type Supplier = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// A string value resolved when a call is made.
///
/// A supplier is invoked once per call, so it can return a different value each
/// time (a key derived from the current request, limits chosen by subscription
/// tier, and so on). A supplier returning `None` counts as absent.
#[derive(Clone)]
pub enum Param {
    /// A fixed value.
    Literal(String),
    /// A value produced on every call.
    Supplier(Supplier),
}

impl Param {
    /// A fixed value.
    pub fn literal(value: impl Into<String>) -> Self {
        Param::Literal(value.into())
    }

    /// A value produced by `f` on every call.
    pub fn supplier<F, S>(f: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Into<Option<String>>,
    {
        Param::Supplier(Arc::new(move || f().into()))
    }

    /// Resolve the current value.
    pub fn resolve(&self) -> Option<String> {
        match self {
            Param::Literal(value) => Some(value.clone()),
            Param::Supplier(f) => f(),
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Param::Supplier(_) => f.write_str("Supplier(..)"),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::literal(value)
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Literal(value)
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Param::Literal(value.clone())
    }
}

/// Limitations, key and exemption for one call site or for a whole limiter.
#[derive(Debug, Clone, Default)]
pub struct LimitParams {
    /// Rule string, e.g. `"10/minute;100/day"`
    pub limitations: Option<Param>,
    /// Key partitioning the invocation log
    pub key: Option<Param>,
    /// Key value that bypasses throttling
    pub exempt: Option<Param>,
}

impl LimitParams {
    /// Parameters with nothing set.
    pub fn new() -> Self {
        Self::default()
    }
}

/// What a call resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The key equals the exempt value; the call bypasses throttling.
    Exempt {
        /// The resolved key
        key: String,
    },
    /// No key could be resolved; the call is not throttled.
    Unkeyed,
    /// The call is evaluated against `limitations` for `key`.
    Throttle {
        /// The resolved key
        key: String,
        /// The resolved rule string, if any
        limitations: Option<String>,
    },
}

/// Resolve a call's parameters, falling back to the limiter defaults.
///
/// Each parameter takes the per-call value; when that is absent or resolves to
/// nothing, the default is resolved instead.
pub fn resolve(call: &LimitParams, defaults: &LimitParams) -> Resolution {
    let key = resolve_one(&call.key, &defaults.key);
    let limitations = resolve_one(&call.limitations, &defaults.limitations);
    let exempt = resolve_one(&call.exempt, &defaults.exempt);

    match key {
        None => Resolution::Unkeyed,
        Some(key) if exempt.as_deref() == Some(key.as_str()) => Resolution::Exempt { key },
        Some(key) => Resolution::Throttle { key, limitations },
    }
}

fn resolve_one(call: &Option<Param>, default: &Option<Param>) -> Option<String> {
    call.as_ref()
        .and_then(Param::resolve)
        .or_else(|| default.as_ref().and_then(Param::resolve))
}
