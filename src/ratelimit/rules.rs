//! Rate rule parsing and validation.
//!
//! A rule string is a list of `<count>/<period>` rules separated by `;` or `,`.
//! `per` may be used in place of `/`, whitespace is ignored, and a period may be
//! prefixed with a multiplier (`10/5minute` allows 10 calls every five minutes).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RuleError;

/// Time period a rule counts calls over.
///
/// Months and years are fixed lengths (30 and 365 days), not calendar-aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// All periods, in increasing length.
    pub const ALL: [Period; 7] = [
        Period::Second,
        Period::Minute,
        Period::Hour,
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Year,
    ];

    /// Length of this period in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Period::Second => 1,
            Period::Minute => 60,
            Period::Hour => 60 * 60,
            Period::Day => 60 * 60 * 24,
            Period::Week => 60 * 60 * 24 * 7,
            Period::Month => 60 * 60 * 24 * 30,
            Period::Year => 60 * 60 * 24 * 365,
        }
    }

    /// Get the duration of this period.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// The name used for this period in rule strings.
    pub fn name(&self) -> &'static str {
        match self {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl FromStr for Period {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .iter()
            .copied()
            .find(|period| period.name() == s)
            .ok_or(())
    }
}

/// A single `count per window` constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    /// Calls admitted per window
    pub count: f64,
    /// Base period of the window
    pub period: Period,
    /// Number of periods making up the window
    pub multiplier: u32,
}

impl Rule {
    /// Create a rule over a single period.
    pub fn new(count: f64, period: Period) -> Self {
        Self {
            count,
            period,
            multiplier: 1,
        }
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> f64 {
        (self.period.seconds() * u64::from(self.multiplier)) as f64
    }

    /// Whether `timestamp` has left this rule's window at `now`.
    pub fn is_stale(&self, timestamp: f64, now: f64) -> bool {
        now - timestamp >= self.window_secs()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiplier == 1 {
            write!(f, "{}/{}", self.count, self.period.name())
        } else {
            write!(f, "{}/{}{}", self.count, self.multiplier, self.period.name())
        }
    }
}

/// An ordered, non-empty conjunction of rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Parse and validate a rule string.
    ///
    /// Errors name the first offending rule by its position.
    pub fn parse(input: &str) -> Result<Self, RuleError> {
        let normalized = normalize(input);
        let body = normalized.strip_suffix(';').unwrap_or(&normalized);

        if body.is_empty() {
            return Err(RuleError::Empty);
        }

        let rules = body
            .split(';')
            .enumerate()
            .map(|(index, rule)| parse_rule(index, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// The rules, in the order they were written.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Always false for a parsed rule set.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `timestamp` is stale with respect to every rule.
    pub fn is_stale(&self, timestamp: f64, now: f64) -> bool {
        self.rules.iter().all(|rule| rule.is_stale(timestamp, now))
    }
}

impl FromStr for RuleSet {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleSet::parse(s)
    }
}

/// Collapse a rule string to `count/period;count/period;`.
fn normalize(input: &str) -> String {
    let mut normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace("per", "/")
        .replace(',', ";");

    if !normalized.ends_with(';') {
        normalized.push(';');
    }
    normalized
}

fn parse_rule(index: usize, rule: &str) -> Result<Rule, RuleError> {
    let malformed = || RuleError::Malformed {
        index,
        rule: rule.to_string(),
    };

    let (count, window) = rule.split_once('/').ok_or_else(malformed)?;

    if !is_decimal(count) {
        return Err(malformed());
    }
    let count: f64 = count.parse().map_err(|_| malformed())?;
    if count <= 0.0 {
        return Err(RuleError::NonPositiveCount { index });
    }

    let digits = window.bytes().take_while(u8::is_ascii_digit).count();
    let (multiplier, name) = window.split_at(digits);

    let multiplier = if multiplier.is_empty() {
        1
    } else {
        multiplier.parse::<u32>().map_err(|_| malformed())?
    };
    if multiplier == 0 {
        return Err(RuleError::ZeroMultiplier { index });
    }

    if name.is_empty() {
        return Err(malformed());
    }
    let period = name.parse::<Period>().map_err(|_| RuleError::UnknownPeriod {
        index,
        period: name.to_string(),
    })?;

    Ok(Rule {
        count,
        period,
        multiplier,
    })
}

/// `digits` or `digits.digits`
fn is_decimal(s: &str) -> bool {
    let (whole, fraction) = match s.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (s, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    all_digits(whole) && fraction.map_or(true, all_digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_seconds() {
        assert_eq!(Period::Second.seconds(), 1);
        assert_eq!(Period::Minute.seconds(), 60);
        assert_eq!(Period::Hour.seconds(), 3600);
        assert_eq!(Period::Day.seconds(), 86400);
        assert_eq!(Period::Week.seconds(), 604800);
        assert_eq!(Period::Month.seconds(), 2592000);
        assert_eq!(Period::Year.seconds(), 31536000);
        assert_eq!(Period::Minute.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_single_rule() {
        let rules = RuleSet::parse("3/minute").unwrap();
        assert_eq!(rules.rules(), &[Rule::new(3.0, Period::Minute)]);
    }

    #[test]
    fn test_parse_per_and_whitespace() {
        let rules = RuleSet::parse("5 per minute").unwrap();
        assert_eq!(rules.rules(), &[Rule::new(5.0, Period::Minute)]);

        let rules = RuleSet::parse(" 5 / hour ").unwrap();
        assert_eq!(rules.rules(), &[Rule::new(5.0, Period::Hour)]);
    }

    #[test]
    fn test_parse_multiple_rules_keeps_order() {
        let rules = RuleSet::parse("1/second;3/minute").unwrap();
        assert_eq!(
            rules.rules(),
            &[Rule::new(1.0, Period::Second), Rule::new(3.0, Period::Minute)]
        );

        let rules = RuleSet::parse("100 per day, 10 per hour;").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.rules()[0].period, Period::Day);
        assert_eq!(rules.rules()[1].period, Period::Hour);
    }

    #[test]
    fn test_parse_fractional_count_and_multiplier() {
        let rules = RuleSet::parse("2.5/10second").unwrap();
        let rule = rules.rules()[0];
        assert_eq!(rule.count, 2.5);
        assert_eq!(rule.multiplier, 10);
        assert_eq!(rule.window_secs(), 10.0);
        assert_eq!(rule.to_string(), "2.5/10second");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(RuleSet::parse(""), Err(RuleError::Empty));
        assert_eq!(RuleSet::parse(" ; "), Err(RuleError::Empty));
        assert!(matches!(
            RuleSet::parse("wrong input"),
            Err(RuleError::Malformed { index: 0, .. })
        ));
        assert!(matches!(
            RuleSet::parse("3/minute;;1/second"),
            Err(RuleError::Malformed { index: 1, .. })
        ));
        assert!(matches!(
            RuleSet::parse("-3/minute"),
            Err(RuleError::Malformed { .. })
        ));
        assert!(matches!(
            RuleSet::parse("3/"),
            Err(RuleError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_reports_first_bad_rule() {
        assert_eq!(
            RuleSet::parse("1/second;3/fortnight;x/y"),
            Err(RuleError::UnknownPeriod {
                index: 1,
                period: "fortnight".to_string()
            })
        );
        assert_eq!(
            RuleSet::parse("0/minute"),
            Err(RuleError::NonPositiveCount { index: 0 })
        );
        assert_eq!(
            RuleSet::parse("3/0minute"),
            Err(RuleError::ZeroMultiplier { index: 0 })
        );
    }

    #[test]
    fn test_periods_are_case_sensitive_and_singular() {
        assert!(RuleSet::parse("3/Minute").is_err());
        assert!(RuleSet::parse("3/minutes").is_err());
    }

    #[test]
    fn test_rule_set_staleness_is_conjunctive() {
        let rules = RuleSet::parse("1/second;3/minute").unwrap();
        let now = 1000.0;
        // stale for the per-second rule only
        assert!(!rules.is_stale(now - 5.0, now));
        assert!(rules.is_stale(now - 60.0, now));
    }
}
