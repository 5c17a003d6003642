//! Collects check outcomes and renders the Nagios plugin output contract:
//! one line on stdout and an exit code.
use std::fmt;

use crate::probe_modules::threshold::Severity;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub severity: Severity,
    pub message: String,
}

/// A machine-readable value emitted after the `|` for graphing.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfDatum {
    pub label: String,
    pub unit: String,
    pub value: f64,
}

impl fmt::Display for PerfDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs_quotes = self
            .label
            .chars()
            .any(|c| c.is_whitespace() || c == '=' || c == '\'');
        if needs_quotes {
            write!(f, "'{}'", self.label.replace('\'', "''"))?;
        } else {
            f.write_str(&self.label)?;
        }
        write!(f, "={}{};;;;", self.value, self.unit)
    }
}

#[derive(Debug, Default)]
pub struct Reporter {
    results: Vec<CheckResult>,
    perf_data: Vec<PerfDatum>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, severity: Severity, message: impl Into<String>) {
        self.results.push(CheckResult {
            severity,
            message: message.into(),
        });
    }

    pub fn add_perf_datum(&mut self, label: impl Into<String>, unit: impl Into<String>, value: f64) {
        self.perf_data.push(PerfDatum {
            label: label.into(),
            unit: unit.into(),
            value,
        });
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn perf_data(&self) -> &[PerfDatum] {
        &self.perf_data
    }

    /// UNKNOWN dominates; otherwise the worst severity seen.
    pub fn status(&self) -> Severity {
        self.results
            .iter()
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Unknown)
    }

    /// Renders the output line and the exit code for the final status.
    pub fn finish(&self) -> (String, i32) {
        let status = self.status();
        let message = if self.results.is_empty() {
            "no check result specified".to_string()
        } else {
            self.results
                .iter()
                .filter(|r| r.severity == status)
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut line = format!("{status}: {message}");
        if !self.perf_data.is_empty() {
            let perf = self
                .perf_data
                .iter()
                .map(PerfDatum::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            line.push_str(" | ");
            line.push_str(&perf);
        }
        (line, status.exit_code())
    }
}
