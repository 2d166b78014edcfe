//! Measurements and the end-of-run report.

use bulkbench_core::ReportFormat;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// One timed strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub scenario: String,
    pub strategy: String,
    #[serde(rename = "elapsed_ns", serialize_with = "serialize_nanos")]
    pub elapsed: Duration,
    /// Rows the strategy reported as changed or found.
    pub affected: u64,
    pub started_at: DateTime<Utc>,
}

fn serialize_nanos<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
}

impl Measurement {
    pub fn new(
        scenario: &str,
        strategy: &str,
        elapsed: Duration,
        affected: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scenario: scenario.to_string(),
            strategy: strategy.to_string(),
            elapsed,
            affected,
            started_at,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }

    pub fn elapsed_us(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e6
    }
}

/// Everything measured in one run against one backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub backend: String,
    pub measurements: Vec<Measurement>,
}

impl Report {
    pub fn new(backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
            measurements: Vec::new(),
        }
    }

    pub fn extend(&mut self, measurements: impl IntoIterator<Item = Measurement>) {
        self.measurements.extend(measurements);
    }

    /// Measurements belonging to `scenario`, in run order.
    pub fn scenario<'a>(&'a self, scenario: &'a str) -> impl Iterator<Item = &'a Measurement> {
        self.measurements
            .iter()
            .filter(move |m| m.scenario == scenario)
    }

    /// Shortest elapsed time recorded for `scenario`.
    pub fn fastest(&self, scenario: &str) -> Option<Duration> {
        self.scenario(scenario).map(|m| m.elapsed).min()
    }

    /// `m.elapsed` as a multiple of the fastest run in its scenario.
    pub fn relative(&self, m: &Measurement) -> f64 {
        match self.fastest(&m.scenario) {
            Some(fastest) if !fastest.is_zero() => {
                m.elapsed.as_secs_f64() / fastest.as_secs_f64()
            }
            _ => 1.0,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render(&self, format: ReportFormat) -> serde_json::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_string()),
            ReportFormat::Json => self.to_json(),
        }
    }

    fn scenario_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for m in &self.measurements {
            if !names.contains(&m.scenario.as_str()) {
                names.push(&m.scenario);
            }
        }
        names
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(80))?;
        writeln!(f, "  Bulk Strategy Report | Backend: {}", self.backend)?;
        writeln!(f, "{}", "=".repeat(80))?;

        for scenario in self.scenario_names() {
            writeln!(f, "\n  Scenario: {}", scenario)?;
            writeln!(
                f,
                "  {:32} {:>12} {:>14} {:>9} {:>8}",
                "Strategy", "Time (ms)", "Time (µs)", "Affected", "x fast"
            )?;
            writeln!(f, "  {}", "-".repeat(78))?;
            for m in self.scenario(scenario) {
                writeln!(
                    f,
                    "  {:32} {:>12.3} {:>14.0} {:>9} {:>8.2}",
                    m.strategy,
                    m.elapsed_ms(),
                    m.elapsed_us(),
                    m.affected,
                    self.relative(m),
                )?;
            }
        }

        writeln!(f, "\n{}", "=".repeat(80))
    }
}
