//! Timed scenarios and the strategies they compare.
//!
//! Every scenario runs inside a [`ResetFixture`], so whatever it writes is
//! rolled back when it returns, fails or panics. Only the strategy itself is
//! timed; seeding, loading the rows a strategy starts from and the outcome
//! checks are not.

use crate::report::Measurement;
use crate::seed::{reset_rows, seed};
use bulkbench_core::{
    AssertionError, Assignment, BenchConfig, BenchError, BenchResult, BulkCommand, ConfigError,
    Filter, Foo, FooId, StorageError,
};
use bulkbench_storage::{ResetFixture, Session, StorageBackend};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const SELECT_AND_FILTER: &str = "select_and_filter";
pub const UPDATE_SAME_TYPE: &str = "update_same_type";
pub const STALE_ENTRY_AFTER_UPDATE: &str = "stale_entry_after_update";

// ============================================================================
// FILTER STRATEGIES
// ============================================================================

/// Ways of finding one row by `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Load every row, scan in order.
    Sequential,
    /// Load every row, scan on the rayon pool keeping the first match.
    Parallel,
    /// Push `code = ?` into the query.
    QueryPredicate,
}

impl FilterStrategy {
    pub const ALL: [FilterStrategy; 3] = [
        FilterStrategy::Sequential,
        FilterStrategy::Parallel,
        FilterStrategy::QueryPredicate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FilterStrategy::Sequential => "sequential",
            FilterStrategy::Parallel => "parallel",
            FilterStrategy::QueryPredicate => "query_predicate",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FilterStrategy::Sequential => "Filtering all rows sequentially in process.",
            FilterStrategy::Parallel => "Filtering all rows in parallel in process.",
            FilterStrategy::QueryPredicate => "Select using a WHERE clause.",
        }
    }

    /// The first row (in id order) whose code is `code`.
    pub fn find<B: StorageBackend>(
        &self,
        session: &mut Session<B>,
        code: i32,
    ) -> BenchResult<Option<Foo>> {
        match self {
            FilterStrategy::Sequential => Ok(session
                .query(&Filter::All)?
                .into_iter()
                .find(|f| f.code == code)),
            FilterStrategy::Parallel => Ok(session
                .query(&Filter::All)?
                .par_iter()
                .find_first(|f| f.code == code)
                .cloned()),
            FilterStrategy::QueryPredicate => match session.single_result(&Filter::CodeEq(code)) {
                Ok(foo) => Ok(Some(foo)),
                Err(BenchError::Storage(StorageError::NoResult)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}

// ============================================================================
// UPDATE STRATEGIES
// ============================================================================

/// Rows an update scenario targets and the value it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Exclusive lower bound on `code`.
    pub above: i32,
    /// Exclusive upper bound on `code`.
    pub below: i32,
    pub value: String,
}

impl UpdateTarget {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            above: config.update_above,
            below: config.update_below,
            value: config.updated_value.clone(),
        }
    }

    pub fn filter(&self) -> Filter {
        Filter::code_between(self.above, self.below)
    }

    pub fn assignment(&self) -> Assignment {
        Assignment::Description(self.value.clone())
    }

    pub fn contains(&self, code: i32) -> bool {
        self.above < code && code < self.below
    }
}

/// Ways of setting `description` on every row in an [`UpdateTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Mutate and merge each loaded row, flushing after every one.
    PerRowFlush,
    /// Mutate and merge each loaded row, one flush at the end.
    BatchedFlush,
    /// One `UPDATE ... WHERE id IN (...)` per chunk of loaded ids.
    ChunkedById { chunk_size: usize },
    /// One `UPDATE ... WHERE above < code < below`, nothing loaded.
    DirectBulk,
}

impl UpdateStrategy {
    pub fn all(chunk_size: usize) -> [UpdateStrategy; 4] {
        [
            UpdateStrategy::PerRowFlush,
            UpdateStrategy::BatchedFlush,
            UpdateStrategy::ChunkedById { chunk_size },
            UpdateStrategy::DirectBulk,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateStrategy::PerRowFlush => "per_row_flush",
            UpdateStrategy::BatchedFlush => "batched_flush",
            UpdateStrategy::ChunkedById { .. } => "chunked_by_id",
            UpdateStrategy::DirectBulk => "direct_bulk",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UpdateStrategy::PerRowFlush => "Updating entities iteratively with flush every time.",
            UpdateStrategy::BatchedFlush => "Updating entities iteratively with single flush.",
            UpdateStrategy::ChunkedById { .. } => "Updating loaded entities in chunks by id.",
            UpdateStrategy::DirectBulk => "Updating entities with a single bulk statement.",
        }
    }

    /// Load what the strategy starts from. Untimed.
    pub fn load<B: StorageBackend>(
        &self,
        session: &mut Session<B>,
        target: &UpdateTarget,
    ) -> BenchResult<Vec<Foo>> {
        match self {
            UpdateStrategy::DirectBulk => Ok(Vec::new()),
            _ => session.query(&target.filter()),
        }
    }

    /// Apply the update. Returns flushed rows for the flush strategies and
    /// summed command counts for the bulk ones.
    pub fn run<B: StorageBackend>(
        &self,
        session: &mut Session<B>,
        target: &UpdateTarget,
        loaded: Vec<Foo>,
    ) -> BenchResult<u64> {
        match *self {
            UpdateStrategy::PerRowFlush => {
                let mut written = 0;
                for mut foo in loaded {
                    foo.description.clone_from(&target.value);
                    session.merge(&foo)?;
                    written += session.flush()?;
                }
                Ok(written)
            }
            UpdateStrategy::BatchedFlush => {
                for mut foo in loaded {
                    foo.description.clone_from(&target.value);
                    session.merge(&foo)?;
                }
                session.flush()
            }
            UpdateStrategy::ChunkedById { chunk_size } => {
                if chunk_size == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "in_clause_max".to_string(),
                        value: "0".to_string(),
                        reason: "chunk size must be positive".to_string(),
                    }
                    .into());
                }
                let ids: Vec<FooId> = loaded.iter().filter_map(|f| f.id).collect();
                let mut updated = 0;
                for chunk in ids.chunks(chunk_size) {
                    updated += session.execute(&BulkCommand::update(
                        target.assignment(),
                        Filter::id_in(chunk.iter().copied()),
                    ))?;
                }
                session.flush()?;
                Ok(updated)
            }
            UpdateStrategy::DirectBulk => {
                session.execute(&BulkCommand::update(target.assignment(), target.filter()))
            }
        }
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// Run `f` and time it.
fn timed<T>(f: impl FnOnce() -> BenchResult<T>) -> BenchResult<(T, Duration)> {
    let start = Instant::now();
    let value = f()?;
    Ok((value, start.elapsed()))
}

fn record(
    scenario: &str,
    strategy: &str,
    description: &str,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    affected: u64,
) -> Measurement {
    let elapsed_ms = elapsed.as_millis() as u64;
    tracing::info!(
        scenario,
        strategy,
        elapsed_ms,
        affected,
        "Test {} took {} milliseconds.",
        description,
        elapsed_ms
    );
    Measurement::new(scenario, strategy, elapsed, affected, started_at)
}

fn expect_affected(scenario: &str, expected: u64, actual: u64) -> BenchResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AssertionError::AffectedRows {
            scenario: scenario.to_string(),
            expected,
            actual,
        }
        .into())
    }
}

/// Find the last seeded code with each [`FilterStrategy`].
///
/// One untimed full select warms the backend first. The cache is cleared
/// before every strategy so each one reads from storage.
pub fn select_and_filter<B: StorageBackend>(
    session: &mut Session<B>,
    config: &BenchConfig,
) -> BenchResult<Vec<Measurement>> {
    let mut fixture = ResetFixture::begin(session)?;
    let session: &mut Session<B> = &mut fixture;
    seed(session, config.seed_rows)?;

    session.query(&Filter::All)?;
    session.clear();

    let target = config.filter_target();
    let mut measurements = Vec::with_capacity(FilterStrategy::ALL.len());
    for strategy in FilterStrategy::ALL {
        let started_at = Utc::now();
        let (found, elapsed) = timed(|| strategy.find(&mut *session, target))?;
        let foo = found.ok_or_else(|| AssertionError::MissingMatch {
            scenario: SELECT_AND_FILTER.to_string(),
            code: target,
        })?;
        if foo.code != target {
            return Err(AssertionError::FieldMismatch {
                scenario: SELECT_AND_FILTER.to_string(),
                id: foo.id.ok_or(StorageError::Transient)?,
                field: "code",
                expected: target.to_string(),
                actual: foo.code.to_string(),
            }
            .into());
        }
        measurements.push(record(
            SELECT_AND_FILTER,
            strategy.label(),
            strategy.description(),
            started_at,
            elapsed,
            1,
        ));
        session.clear();
    }

    fixture.finish()?;
    Ok(measurements)
}

/// Run every strategy in `strategies` over a freshly seeded table.
///
/// Before each strategy the table is emptied and reseeded. After it, the
/// reported count must equal [`BenchConfig::expected_updated`] and storage
/// must hold the new value on exactly the targeted rows.
pub fn update_same_type<B: StorageBackend>(
    session: &mut Session<B>,
    config: &BenchConfig,
    strategies: &[UpdateStrategy],
) -> BenchResult<Vec<Measurement>> {
    let mut fixture = ResetFixture::begin(session)?;
    let session: &mut Session<B> = &mut fixture;
    let target = UpdateTarget::from_config(config);
    let expected = config.expected_updated();

    let mut measurements = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        reset_rows(session)?;
        let seeded = seed(session, config.seed_rows)?;
        let loaded = strategy.load(session, &target)?;

        let started_at = Utc::now();
        let (affected, elapsed) = timed(|| strategy.run(&mut *session, &target, loaded))?;
        expect_affected(UPDATE_SAME_TYPE, expected, affected)?;
        verify_update(session, &target, &seeded)?;

        measurements.push(record(
            UPDATE_SAME_TYPE,
            strategy.label(),
            strategy.description(),
            started_at,
            elapsed,
            affected,
        ));
    }

    fixture.finish()?;
    Ok(measurements)
}

/// Compare storage against the seeded rows: targeted rows carry the new
/// description, every other field and row is untouched.
pub fn verify_update<B: StorageBackend>(
    session: &mut Session<B>,
    target: &UpdateTarget,
    seeded: &[Foo],
) -> BenchResult<()> {
    session.clear();
    let stored: HashMap<FooId, Foo> = session
        .query(&Filter::All)?
        .into_iter()
        .filter_map(|f| f.id.map(|id| (id, f)))
        .collect();
    session.clear();

    let mismatch = |id: FooId, field: &'static str, expected: &str, actual: &str| {
        BenchError::from(AssertionError::FieldMismatch {
            scenario: UPDATE_SAME_TYPE.to_string(),
            id,
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    };

    for original in seeded {
        let id = original.id.ok_or(StorageError::Transient)?;
        let current = stored.get(&id).ok_or(StorageError::NotFound { id })?;
        let expected_description = if target.contains(original.code) {
            target.value.as_str()
        } else {
            original.description.as_str()
        };
        if current.description != expected_description {
            return Err(mismatch(
                id,
                "description",
                expected_description,
                &current.description,
            ));
        }
        if current.description2 != original.description2 {
            return Err(mismatch(
                id,
                "description2",
                &original.description2,
                &current.description2,
            ));
        }
    }
    Ok(())
}

/// Fail if `handle` already carries `value`, i.e. a bulk update reached it
/// without a refresh.
pub fn check_stale(handle: &Foo, value: &str) -> BenchResult<()> {
    if handle.description != value {
        return Ok(());
    }
    Err(AssertionError::UnexpectedlyFresh {
        scenario: STALE_ENTRY_AFTER_UPDATE.to_string(),
        id: handle.id.ok_or(StorageError::Transient)?,
    }
    .into())
}

/// Show that a bulk update leaves an already fetched row stale until it is
/// refreshed. Only the update and the refresh are timed.
pub fn stale_entry_after_update<B: StorageBackend>(
    session: &mut Session<B>,
    config: &BenchConfig,
) -> BenchResult<Vec<Measurement>> {
    let mut fixture = ResetFixture::begin(session)?;
    let session: &mut Session<B> = &mut fixture;
    seed(session, 1)?;
    let value = config.updated_value.as_str();

    let mut handle = session.single_result(&Filter::CodeEq(0))?;
    let id = handle.id.ok_or(StorageError::Transient)?;

    let command = BulkCommand::update(
        Assignment::Description(value.to_string()),
        Filter::CodeEq(0),
    );
    let started_at = Utc::now();
    let (affected, update_elapsed) = timed(|| session.execute(&command))?;
    expect_affected(STALE_ENTRY_AFTER_UPDATE, 1, affected)?;
    check_stale(&handle, value)?;

    let ((), refresh_elapsed) = timed(|| session.refresh(&mut handle))?;
    if handle.description != value {
        return Err(AssertionError::FieldMismatch {
            scenario: STALE_ENTRY_AFTER_UPDATE.to_string(),
            id,
            field: "description",
            expected: value.to_string(),
            actual: handle.description,
        }
        .into());
    }
    let elapsed = update_elapsed + refresh_elapsed;

    let measurement = record(
        STALE_ENTRY_AFTER_UPDATE,
        "refresh",
        "Bulk update then refresh of a held entity.",
        started_at,
        elapsed,
        affected,
    );
    fixture.finish()?;
    Ok(vec![measurement])
}
