//! Per-key invocation logs and their garbage collection.

use std::collections::HashMap;

use tracing::debug;

use super::rules::RuleSet;

/// Ordered invocation timestamps for every key seen by a limiter.
///
/// Timestamps for a key are appended in arrival order. The log remembers whether
/// it changed since it was loaded so a shared backend knows when to flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationLog {
    entries: HashMap<String, Vec<f64>>,
    dirty: bool,
}

impl InvocationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a log from its JSON document form, `{"key": [ts, ...]}`.
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        let entries = serde_json::from_str(document)?;
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    /// Serialize the log to its JSON document form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Timestamps recorded for `key`, if the key has an entry.
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Whether `key` has an entry, even an empty one.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Create an empty entry for `key` if it has none.
    pub fn ensure_key(&mut self, key: &str) {
        if !self.entries.contains_key(key) {
            self.entries.insert(key.to_string(), Vec::new());
            self.dirty = true;
        }
    }

    /// Append an invocation at `timestamp` for `key`.
    pub fn record(&mut self, key: &str, timestamp: f64) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .push(timestamp);
        self.dirty = true;
    }

    /// Count timestamps for `key` strictly newer than `now - window_secs`.
    pub fn count_within(&self, key: &str, window_secs: f64, now: f64) -> usize {
        self.get(key)
            .map(|ticks| ticks.iter().filter(|&&t| now - t < window_secs).count())
            .unwrap_or(0)
    }

    /// Drop timestamps for `key` that are stale with respect to every rule.
    ///
    /// A timestamp still inside any rule's window is kept. Returns how many were
    /// removed.
    pub fn collect_garbage(&mut self, key: &str, rules: &RuleSet, now: f64) -> usize {
        let Some(ticks) = self.entries.get_mut(key) else {
            return 0;
        };

        let before = ticks.len();
        ticks.retain(|&t| !rules.is_stale(t, now));
        let removed = before - ticks.len();

        if removed > 0 {
            self.dirty = true;
            debug!(key = %key, removed = removed, "Collected stale invocations");
        }
        removed
    }

    /// Remove the entry for `key`. Returns whether there was one.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Number of keys with an entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key has an entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
