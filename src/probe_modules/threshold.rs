//! Nagios threshold ranges (`[@]start:end`) and severity classification.
//!
//! See <https://nagios-plugins.org/doc/guidelines.html#THRESHOLDFORMAT>.
use std::fmt;
use std::str::FromStr;

use crate::probe_modules::error::ProbeError;

/// Outcome of a check, in the order Nagios ranks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed interval `[start, end]` plus which side of it raises an alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRange {
    pub start: f64,
    pub end: f64,
    pub alert_on_inside: bool,
}

impl Default for ThresholdRange {
    /// `~:`, which never alerts.
    fn default() -> Self {
        Self {
            start: f64::NEG_INFINITY,
            end: f64::INFINITY,
            alert_on_inside: false,
        }
    }
}

impl ThresholdRange {
    pub fn parse(spec: &str) -> Result<Self, ProbeError> {
        let mut rest = spec.trim();
        if rest.is_empty() {
            return Err(ProbeError::Parse("empty range definition".to_string()));
        }

        let mut range = ThresholdRange {
            start: 0.0,
            end: f64::INFINITY,
            alert_on_inside: false,
        };

        if let Some(stripped) = rest.strip_prefix('@') {
            range.alert_on_inside = true;
            rest = stripped;
        }

        let has_lower = match rest.split_once(':') {
            Some((lower, upper)) => {
                range.start = match lower {
                    "~" => f64::NEG_INFINITY,
                    "" => 0.0,
                    value => parse_bound(value, "lower")?,
                };
                rest = upper;
                true
            }
            None => false,
        };

        // A bare number is the upper bound of `0:N`; `~` is only an open end after a colon.
        if !rest.is_empty() && !(has_lower && rest == "~") {
            range.end = parse_bound(rest, "upper")?;
        }

        if range.end < range.start {
            return Err(ProbeError::Parse(format!(
                "invalid range definition '{spec}': start must not exceed end"
            )));
        }
        Ok(range)
    }

    /// True when `value` is in the alerting condition for this range.
    pub fn check(&self, value: f64) -> bool {
        let inside = self.start <= value && value <= self.end;
        if self.alert_on_inside {
            inside
        } else {
            !inside
        }
    }
}

impl FromStr for ThresholdRange {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThresholdRange::parse(s)
    }
}

fn parse_bound(raw: &str, which: &str) -> Result<f64, ProbeError> {
    let value = raw.trim().parse::<f64>().map_err(|e| {
        ProbeError::Parse(format!("failed to parse {which} limit '{raw}': {e}"))
    })?;
    if value.is_nan() {
        return Err(ProbeError::Parse(format!("{which} limit must be a number")));
    }
    Ok(value)
}

/// Classifies `value` against the critical range, then the warning range.
///
/// Each range is parsed only when it is reached, so a critical hit is
/// reported even if the warning range is malformed.
pub fn classify(warning: &str, critical: &str, value: f64) -> Result<Severity, ProbeError> {
    let critical = ThresholdRange::parse(critical)
        .map_err(|e| ProbeError::Parse(format!("Error parsing critical range. Error: {e}")))?;
    if critical.check(value) {
        return Ok(Severity::Critical);
    }

    let warning = ThresholdRange::parse(warning)
        .map_err(|e| ProbeError::Parse(format!("Error parsing warning range. Error: {e}")))?;
    if warning.check(value) {
        return Ok(Severity::Warning);
    }
    Ok(Severity::Ok)
}
