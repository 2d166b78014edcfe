//! Scenario selection and backend wiring.

use crate::report::Report;
use crate::scenario::{self, UpdateStrategy};
use bulkbench_core::{BackendKind, BenchConfig, BenchResult, ConfigError};
use bulkbench_storage::{MemoryStore, Session, SqliteStore, StorageBackend};
use std::fmt;
use std::str::FromStr;

/// Which scenarios a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScenarioKind {
    Select,
    Update,
    Stale,
    #[default]
    All,
}

impl ScenarioKind {
    fn includes(self, other: ScenarioKind) -> bool {
        self == ScenarioKind::All || self == other
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioKind::Select => "select",
            ScenarioKind::Update => "update",
            ScenarioKind::Stale => "stale",
            ScenarioKind::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for ScenarioKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(ScenarioKind::Select),
            "update" => Ok(ScenarioKind::Update),
            "stale" => Ok(ScenarioKind::Stale),
            "all" => Ok(ScenarioKind::All),
            _ => Err(ConfigError::InvalidValue {
                field: "scenario".to_string(),
                value: s.to_string(),
                reason: "expected select, update, stale or all".to_string(),
            }),
        }
    }
}

/// Runs scenarios against one session and collects their measurements.
pub struct Harness<B: StorageBackend> {
    session: Session<B>,
    config: BenchConfig,
    report: Report,
}

impl<B: StorageBackend> Harness<B> {
    /// Validate `config` against itself and against the backend's
    /// parameter cap, then wrap a fresh session over `backend`.
    pub fn new(backend: B, config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        if let Some(limit) = backend.parameter_limit() {
            if config.in_clause_max > limit {
                return Err(ConfigError::InvalidValue {
                    field: "in_clause_max".to_string(),
                    value: config.in_clause_max.to_string(),
                    reason: format!("backend {} binds at most {} parameters", backend.name(), limit),
                }
                .into());
            }
        }
        let report = Report::new(backend.name());
        Ok(Self {
            session: Session::new(backend),
            config,
            report,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    /// Run the selected scenarios in order, stopping at the first failure.
    pub fn run(&mut self, kind: ScenarioKind) -> BenchResult<()> {
        if kind.includes(ScenarioKind::Select) {
            self.run_select()?;
        }
        if kind.includes(ScenarioKind::Update) {
            let strategies = UpdateStrategy::all(self.config.in_clause_max);
            self.run_update(&strategies)?;
        }
        if kind.includes(ScenarioKind::Stale) {
            self.run_stale()?;
        }
        Ok(())
    }

    pub fn run_select(&mut self) -> BenchResult<()> {
        let measurements = scenario::select_and_filter(&mut self.session, &self.config)?;
        self.report.extend(measurements);
        Ok(())
    }

    pub fn run_update(&mut self, strategies: &[UpdateStrategy]) -> BenchResult<()> {
        let measurements =
            scenario::update_same_type(&mut self.session, &self.config, strategies)?;
        self.report.extend(measurements);
        Ok(())
    }

    pub fn run_stale(&mut self) -> BenchResult<()> {
        let measurements = scenario::stale_entry_after_update(&mut self.session, &self.config)?;
        self.report.extend(measurements);
        Ok(())
    }
}

/// Build the backend `config` names and run `kind` against it.
pub fn run_configured(config: BenchConfig, kind: ScenarioKind) -> BenchResult<Report> {
    match config.backend {
        BackendKind::Memory => {
            let backend = MemoryStore::new().with_parameter_limit(config.parameter_limit);
            run_with(backend, config, kind)
        }
        BackendKind::Sqlite => {
            let backend = match &config.sqlite_path {
                Some(path) => SqliteStore::open(path)?,
                None => SqliteStore::open_in_memory()?,
            }
            .with_parameter_limit(config.parameter_limit);
            run_with(backend, config, kind)
        }
    }
}

fn run_with<B: StorageBackend>(
    backend: B,
    config: BenchConfig,
    kind: ScenarioKind,
) -> BenchResult<Report> {
    tracing::info!(backend = backend.name(), scenario = %kind, rows = config.seed_rows, "starting run");
    let mut harness = Harness::new(backend, config)?;
    harness.run(kind)?;
    Ok(harness.into_report())
}
