//! Allow/deny decisions over an invocation log.

use tracing::{debug, trace};

use super::log::InvocationLog;
use super::rules::{Rule, RuleSet};

/// Outcome of evaluating a key's rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Every rule has capacity left; the call should be recorded.
    Allowed,
    /// `rule` is exhausted for the key.
    Denied {
        /// The first exhausted rule, in rule string order
        rule: Rule,
    },
    /// No usable rules were given, so the call is not throttled or recorded.
    Unrestricted,
}

impl Decision {
    /// Whether the call may proceed.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Denied { .. })
    }
}

/// Decide whether `key` may make another call at `now`.
///
/// Absent or unparsable rules fail open without touching the log. Otherwise the
/// key's entry is created if missing and garbage is collected across all rules
/// before any rule is checked, even when the outcome is a denial. Rules are then
/// checked in order and the first exhausted one denies the call.
///
/// The log is not updated with the current call; on `Allowed` the caller records it.
pub fn evaluate(
    log: &mut InvocationLog,
    key: &str,
    limitations: Option<&str>,
    now: f64,
) -> Decision {
    let Some(limitations) = limitations else {
        trace!(key = %key, "No limitations configured");
        return Decision::Unrestricted;
    };

    let rules = match RuleSet::parse(limitations) {
        Ok(rules) => rules,
        Err(e) => {
            debug!(key = %key, limitations = %limitations, error = %e, "Ignoring invalid limitations");
            return Decision::Unrestricted;
        }
    };

    log.ensure_key(key);
    log.collect_garbage(key, &rules, now);

    for rule in rules.rules() {
        let used = log.count_within(key, rule.window_secs(), now);
        if used as f64 >= rule.count {
            debug!(key = %key, rule = %rule, used = used, "Rule exhausted");
            return Decision::Denied { rule: *rule };
        }
    }

    Decision::Allowed
}
