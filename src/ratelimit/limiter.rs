//! The limiter facade: resolves each call, evaluates it and records it.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use super::backend::{LocalBackend, LogBackend, SharedBackend, DEFAULT_DATABASE_NAME};
use super::clock::{Clock, SystemClock};
use super::evaluator::{evaluate, Decision};
use super::resolver::{resolve, LimitParams, Param, Resolution};
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};
use crate::store::SharedLog;

/// Throttles calls per key against sliding-window rules.
///
/// A limiter owns its invocation log, either in process memory (the default) or
/// as a document in a [`SharedLog`] store. Defaults for limitations, key and
/// exemption are fixed at construction and apply to every call that does not
/// set its own.
///
/// The limiter is `Send + Sync`; share it between threads with an `Arc`.
pub struct Limiter<B = LocalBackend> {
    backend: B,
    defaults: LimitParams,
    clock: Arc<dyn Clock>,
}

impl Limiter<LocalBackend> {
    /// Create an in-process limiter with no defaults.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a limiter.
    pub fn builder() -> LimiterBuilder {
        LimiterBuilder::new()
    }
}

impl Default for Limiter<LocalBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SharedLog> Limiter<SharedBackend<S>> {
    /// Create a limiter keeping its log in `store` under the default database name.
    pub fn with_shared_log(store: S) -> Result<Self> {
        LimiterBuilder::new().build_shared(store)
    }

    /// Identifier of the shared log document.
    pub fn database(&self) -> &str {
        self.backend.database()
    }
}

impl<B: LogBackend> Limiter<B> {
    /// Begin a limited call site.
    ///
    /// The returned [`Limit`] is configured with limitations, key and exemption
    /// and then used to check, call or wrap functions.
    pub fn limit(&self) -> Limit<'_, B> {
        Limit {
            limiter: self,
            params: LimitParams::new(),
        }
    }

    /// Admit or deny one call made with `params`.
    ///
    /// Exempt and unkeyed calls are admitted without touching the log. Otherwise
    /// the call is evaluated and, when allowed, recorded in the same transaction.
    /// Returns [`LimiterError::RateLimitExceeded`] on denial.
    pub fn check(&self, params: &LimitParams) -> Result<()> {
        let (key, limitations) = match resolve(params, &self.defaults) {
            Resolution::Exempt { key } => {
                trace!(key = %key, "Exempt call admitted");
                return Ok(());
            }
            Resolution::Unkeyed => {
                trace!("Unkeyed call admitted");
                return Ok(());
            }
            Resolution::Throttle { key, limitations } => (key, limitations),
        };

        let decision = self.backend.transact(|log| {
            let now = self.clock.now();
            let decision = evaluate(log, &key, limitations.as_deref(), now);
            if decision == Decision::Allowed {
                log.record(&key, now);
            }
            decision
        })?;

        trace!(key = %key, decision = ?decision, "Checked call");

        match decision {
            Decision::Denied { .. } => Err(LimiterError::RateLimitExceeded),
            Decision::Allowed | Decision::Unrestricted => Ok(()),
        }
    }

    /// Forget every recorded call for `key`. Resetting an unknown key is a no-op.
    pub fn reset(&self, key: impl Into<Param>) -> Result<()> {
        let Some(key) = key.into().resolve() else {
            return Ok(());
        };

        let removed = self.backend.transact(|log| log.remove(&key))?;
        debug!(key = %key, removed = removed, "Reset key");
        Ok(())
    }

    /// Timestamps currently recorded for `key`, oldest first.
    pub fn entries(&self, key: &str) -> Result<Vec<f64>> {
        self.backend
            .transact(|log| log.get(key).map(<[f64]>::to_vec).unwrap_or_default())
    }

    /// The defaults applied to calls that leave a parameter unset.
    pub fn defaults(&self) -> &LimitParams {
        &self.defaults
    }

    /// The log backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B> std::fmt::Debug for Limiter<B>
where
    B: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("backend", &self.backend)
            .field("defaults", &self.defaults)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`Limiter`].
pub struct LimiterBuilder {
    defaults: LimitParams,
    database_name: String,
    clock: Arc<dyn Clock>,
}

impl LimiterBuilder {
    /// A builder with no defaults, the default database name and the system clock.
    pub fn new() -> Self {
        Self {
            defaults: LimitParams::new(),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Limitations used when a call sets none.
    pub fn default_limitations(mut self, limitations: impl Into<Param>) -> Self {
        self.defaults.limitations = Some(limitations.into());
        self
    }

    /// Key used when a call sets none.
    pub fn default_key(mut self, key: impl Into<Param>) -> Self {
        self.defaults.key = Some(key.into());
        self
    }

    /// Exempt value used when a call sets none.
    pub fn default_exempt(mut self, exempt: impl Into<Param>) -> Self {
        self.defaults.exempt = Some(exempt.into());
        self
    }

    /// Identifier of the shared log document. Ignored for in-process limiters.
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Time source for invocation timestamps.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Apply the defaults and database name from a configuration.
    pub fn with_config(mut self, config: &LimiterConfig) -> Self {
        let limits = &config.limits;
        if let Some(limitations) = &limits.limitations {
            self = self.default_limitations(limitations);
        }
        if let Some(key) = &limits.key {
            self = self.default_key(key);
        }
        if let Some(exempt) = &limits.exempt {
            self = self.default_exempt(exempt);
        }
        self.database_name(config.storage.database_name.clone())
    }

    /// Build an in-process limiter.
    pub fn build(self) -> Limiter<LocalBackend> {
        debug!(defaults = ?self.defaults, "Created in-process limiter");
        Limiter {
            backend: LocalBackend::new(),
            defaults: self.defaults,
            clock: self.clock,
        }
    }

    /// Build a limiter whose log lives in `store`.
    ///
    /// Fails if the store cannot be reached to create the log document.
    pub fn build_shared<S: SharedLog>(self, store: S) -> Result<Limiter<SharedBackend<S>>> {
        let backend = SharedBackend::new(store, self.database_name)?;
        debug!(database = %backend.database(), defaults = ?self.defaults, "Created shared limiter");
        Ok(Limiter {
            backend,
            defaults: self.defaults,
            clock: self.clock,
        })
    }
}

impl Default for LimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A limited call site: the limitations, key and exemption for a set of calls.
///
/// Parameters left unset fall back to the limiter's defaults at call time.
#[derive(Debug)]
pub struct Limit<'a, B> {
    limiter: &'a Limiter<B>,
    params: LimitParams,
}

impl<B> Clone for Limit<'_, B> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter,
            params: self.params.clone(),
        }
    }
}

impl<'a, B: LogBackend> Limit<'a, B> {
    /// Rule string for these calls, e.g. `"10/minute;100/day"`.
    pub fn limitations(mut self, limitations: impl Into<Param>) -> Self {
        self.params.limitations = Some(limitations.into());
        self
    }

    /// Key these calls are counted under.
    pub fn key(mut self, key: impl Into<Param>) -> Self {
        self.params.key = Some(key.into());
        self
    }

    /// Key value for which calls bypass throttling.
    pub fn exempt(mut self, exempt: impl Into<Param>) -> Self {
        self.params.exempt = Some(exempt.into());
        self
    }

    /// The parameters configured on this call site.
    pub fn params(&self) -> &LimitParams {
        &self.params
    }

    /// Admit or deny one call, recording it when admitted.
    pub fn check(&self) -> Result<()> {
        self.limiter.check(&self.params)
    }

    /// Run `f` if the call is admitted, passing its result through.
    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        self.check()?;
        Ok(f())
    }

    /// Admit the call now and, if admitted, create the future from `f`.
    ///
    /// The decision is made before `f` runs, so a denied call never creates its
    /// future. An admitted call stays counted even if the future is dropped.
    pub fn call_async<Fut, F>(&self, f: F) -> Result<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.check()?;
        Ok(f())
    }

    /// Wrap `f` so every invocation is limited by this call site.
    ///
    /// Functions of several arguments take them as a tuple.
    pub fn wrap<A, R, F>(self, f: F) -> impl Fn(A) -> Result<R> + 'a
    where
        F: Fn(A) -> R + 'a,
    {
        move |args: A| -> Result<R> {
            self.check()?;
            Ok(f(args))
        }
    }

    /// Wrap an async function; see [`Limit::call_async`] for when the check runs.
    pub fn wrap_async<A, Fut, F>(self, f: F) -> impl Fn(A) -> Result<Fut> + 'a
    where
        F: Fn(A) -> Fut + 'a,
        Fut: Future,
    {
        move |args: A| -> Result<Fut> {
            self.check()?;
            Ok(f(args))
        }
    }
}
