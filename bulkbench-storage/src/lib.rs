//! bulkbench Storage - Backend Trait, Session and Fixtures
//!
//! Defines the storage abstraction the harness drives:
//! - [`StorageBackend`]: what a storage engine must provide (transactions,
//!   inserts, ordered selects, row writes, bulk commands)
//! - [`MemoryStore`] and [`SqliteStore`]: the two engines shipped here
//! - [`Session`]: the object layer on top, with an identity cache, dirty
//!   checking, flush, clear, merge and refresh
//! - [`ResetFixture`]: a transaction guard that always rolls back

pub mod fixture;
pub mod memory;
pub mod session;
pub mod sqlite;
mod stats;

pub use fixture::ResetFixture;
pub use memory::MemoryStore;
pub use session::{FlushMode, Session};
pub use sqlite::SqliteStore;
pub use stats::StoreStats;

use bulkbench_core::{BenchResult, BulkCommand, Filter, Foo, FooId, StorageError};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage engine contract.
///
/// Every method is one round trip to the engine. Writes inside a transaction
/// are undone by [`StorageBackend::rollback`]; writes outside one autocommit.
pub trait StorageBackend: Send {
    /// Short engine name for logs and reports.
    fn name(&self) -> &'static str;

    // === Transaction Control ===

    /// Begin a transaction. Fails if one is already active.
    fn begin(&self) -> BenchResult<()>;

    /// Commit the active transaction.
    fn commit(&self) -> BenchResult<()>;

    /// Undo every write since `begin`.
    fn rollback(&self) -> BenchResult<()>;

    /// Whether a transaction is active.
    fn in_transaction(&self) -> BenchResult<bool>;

    // === Row Operations ===

    /// Insert transient rows, returning the generated ids in input order.
    fn insert(&self, rows: &[Foo]) -> BenchResult<Vec<FooId>>;

    /// Get a row by id.
    fn find(&self, id: FooId) -> BenchResult<Option<Foo>>;

    /// Rows matching `filter`, ordered by id.
    fn select(&self, filter: &Filter) -> BenchResult<Vec<Foo>>;

    /// Overwrite full rows by id. Fails with `NotFound` if a row is gone.
    fn update(&self, rows: &[Foo]) -> BenchResult<u64>;

    /// Run a bulk command, returning the affected-row count.
    fn execute(&self, command: &BulkCommand) -> BenchResult<u64>;

    // === Introspection ===

    /// Longest parameter list a single statement may bind, if capped.
    fn parameter_limit(&self) -> Option<usize>;

    /// Traffic counters.
    fn stats(&self) -> StoreStats;
}

/// Reject `filter` if its parameter list is longer than `limit`.
pub(crate) fn check_parameter_limit(limit: Option<usize>, filter: &Filter) -> BenchResult<()> {
    match limit {
        Some(limit) if filter.parameter_count() > limit => {
            Err(StorageError::ParameterLimitExceeded {
                limit,
                got: filter.parameter_count(),
            }
            .into())
        }
        _ => Ok(()),
    }
}


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use bulkbench_core::Assignment;
    use proptest::prelude::*;

    fn seeded_store(n: i32) -> MemoryStore {
        let store = MemoryStore::new();
        let rows: Vec<Foo> = (0..n).map(Foo::seeded).collect();
        store.insert(&rows).unwrap();
        store
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A bulk update affects exactly the rows the filter matches in-process.
        #[test]
        fn prop_bulk_update_affects_matching_rows(
            n in 1i32..200,
            above in -5i32..200,
            width in 0i32..200,
        ) {
            let store = seeded_store(n);
            let filter = Filter::code_between(above, above + width);
            let before = store.select(&Filter::All).unwrap();
            let expected = before.iter().filter(|f| filter.matches(f)).count() as u64;

            let affected = store
                .execute(&BulkCommand::update(
                    Assignment::Description("UPDATED".to_string()),
                    filter.clone(),
                ))
                .unwrap();
            prop_assert_eq!(affected, expected);

            let after = store.select(&Filter::All).unwrap();
            for (old, new) in before.iter().zip(after.iter()) {
                if filter.matches(old) {
                    prop_assert_eq!(new.description.as_str(), "UPDATED");
                } else {
                    prop_assert_eq!(&new.description, &old.description);
                }
            }
        }

        /// Anything done inside a transaction is gone after rollback.
        #[test]
        fn prop_rollback_restores_snapshot(
            n in 0i32..100,
            extra in 0i32..50,
            delete_below in 0i32..100,
        ) {
            let store = seeded_store(n);
            let snapshot = store.select(&Filter::All).unwrap();

            store.begin().unwrap();
            let rows: Vec<Foo> = (0..extra).map(Foo::seeded).collect();
            store.insert(&rows).unwrap();
            store
                .execute(&BulkCommand::delete(Filter::code_between(-1, delete_below)))
                .unwrap();
            store.rollback().unwrap();

            prop_assert_eq!(store.select(&Filter::All).unwrap(), snapshot);
        }
    }
}
