//! Benchmark configuration.
//!
//! Values come from defaults, a TOML file, or `BULKBENCH_*` environment
//! variables. Call [`BenchConfig::validate`] before handing a config to the
//! harness.

use crate::{BenchResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which storage engine the harness drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process transactional store.
    #[default]
    Memory,
    /// Embedded SQLite.
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: other.to_string(),
                reason: "expected memory or sqlite".to_string(),
            }),
        }
    }
}

/// Output format of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                field: "report_format".to_string(),
                value: other.to_string(),
                reason: "expected text or json".to_string(),
            }),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                field: "log_format".to_string(),
                value: other.to_string(),
                reason: "expected pretty or json".to_string(),
            }),
        }
    }
}

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Rows seeded before each scenario step.
    pub seed_rows: usize,
    /// Update scenarios touch rows with `update_above < code < update_below`.
    pub update_above: i32,
    pub update_below: i32,
    /// Chunk size for the chunked-by-id update strategy.
    pub in_clause_max: usize,
    /// Parameter-list limit enforced by the backend. `None` means unlimited.
    pub parameter_limit: Option<usize>,
    pub backend: BackendKind,
    /// SQLite database file. `None` opens an in-memory database.
    pub sqlite_path: Option<PathBuf>,
    /// Value every update strategy writes into `description`.
    pub updated_value: String,
    pub report_format: ReportFormat,
    pub log_format: LogFormat,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            seed_rows: 20_000,
            update_above: 10_000,
            update_below: 15_000,
            in_clause_max: 1000,
            parameter_limit: Some(1000),
            backend: BackendKind::Memory,
            sqlite_path: None,
            updated_value: "UPDATED".to_string(),
            report_format: ReportFormat::Text,
            log_format: LogFormat::Pretty,
        }
    }
}

impl BenchConfig {
    /// Create a configuration from environment variables over the defaults.
    ///
    /// Environment variables:
    /// - `BULKBENCH_SEED_ROWS` (default: 20000)
    /// - `BULKBENCH_UPDATE_ABOVE` / `BULKBENCH_UPDATE_BELOW` (default: 10000 / 15000)
    /// - `BULKBENCH_IN_CLAUSE_MAX` (default: 1000)
    /// - `BULKBENCH_PARAMETER_LIMIT`: a number, or `none` (default: 1000)
    /// - `BULKBENCH_BACKEND`: `memory` or `sqlite` (default: memory)
    /// - `BULKBENCH_SQLITE_PATH`: database file (default: in-memory)
    /// - `BULKBENCH_UPDATED_VALUE` (default: UPDATED)
    /// - `BULKBENCH_REPORT_FORMAT`: `text` or `json` (default: text)
    /// - `BULKBENCH_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `BULKBENCH_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        Self::apply_overrides(self, |key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "BULKBENCH_SEED_ROWS") {
            self.seed_rows = v;
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_UPDATE_ABOVE") {
            self.update_above = v;
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_UPDATE_BELOW") {
            self.update_below = v;
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_IN_CLAUSE_MAX") {
            self.in_clause_max = v;
        }
        if let Some(raw) = lookup("BULKBENCH_PARAMETER_LIMIT") {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("none") {
                self.parameter_limit = None;
            } else if let Ok(v) = raw.parse() {
                self.parameter_limit = Some(v);
            }
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_BACKEND") {
            self.backend = v;
        }
        if let Some(path) = lookup("BULKBENCH_SQLITE_PATH").filter(|p| !p.trim().is_empty()) {
            self.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(v) = lookup("BULKBENCH_UPDATED_VALUE") {
            self.updated_value = v;
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_REPORT_FORMAT") {
            self.report_format = v;
        }
        if let Some(v) = parsed(&lookup, "BULKBENCH_LOG_FORMAT") {
            self.log_format = v;
        }
        self
    }

    /// Load a configuration from a TOML file. Missing keys take defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - seed_rows > 0 and fits the `code` column
    /// - update_above < update_below <= seed_rows
    /// - in_clause_max > 0 and within parameter_limit when one is set
    /// - updated_value is non-empty
    pub fn validate(&self) -> BenchResult<()> {
        if self.seed_rows == 0 || i32::try_from(self.seed_rows).is_err() {
            return Err(invalid(
                "seed_rows",
                self.seed_rows,
                "seed_rows must be between 1 and i32::MAX",
            ));
        }

        if self.update_above >= self.update_below {
            return Err(invalid(
                "update_below",
                self.update_below,
                "update_below must be greater than update_above",
            ));
        }

        if self.update_below as i64 > self.seed_rows as i64 {
            return Err(invalid(
                "update_below",
                self.update_below,
                "update range must lie within the seeded codes",
            ));
        }

        if self.in_clause_max == 0 {
            return Err(invalid(
                "in_clause_max",
                self.in_clause_max,
                "in_clause_max must be greater than 0",
            ));
        }

        if let Some(limit) = self.parameter_limit {
            if self.in_clause_max > limit {
                return Err(invalid(
                    "in_clause_max",
                    self.in_clause_max,
                    "in_clause_max must not exceed parameter_limit",
                ));
            }
        }

        if self.updated_value.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "updated_value".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Rows every update strategy must touch.
    pub fn expected_updated(&self) -> u64 {
        let lowest = self.update_above.max(-1) as i64 + 1;
        let highest = (self.update_below as i64 - 1).min(self.seed_rows as i64 - 1);
        (highest - lowest + 1).max(0) as u64
    }

    /// Code the filter scenario searches for: the last seeded one.
    pub fn filter_target(&self) -> i32 {
        i32::try_from(self.seed_rows).map_or(i32::MAX, |n| n - 1)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::BenchError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
