//! bulkbench Test Utilities
//!
//! Shared test infrastructure for the bulkbench workspace:
//! - Proptest generators for rows, filters and code ranges
//! - Fixtures that hand out fresh sessions over either backend
//! - Assertions for seeded code sets and update outcomes

// Re-export core types for convenience
pub use bulkbench_core::{
    Assignment, BenchConfig, BenchError, BenchResult, BulkCommand, Filter, Foo, FooId,
    StorageError,
};
pub use bulkbench_storage::{MemoryStore, Session, SqliteStore, StorageBackend};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;

    /// Generate a UUID-shaped text field like seeding writes, or a short
    /// arbitrary one.
    pub fn arb_description() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}",
            "[a-zA-Z0-9 ]{0,40}",
        ]
    }

    /// Generate a transient row.
    pub fn arb_foo() -> impl Strategy<Value = Foo> {
        (-10_000i32..10_000, arb_description(), arb_description())
            .prop_map(|(code, d, d2)| Foo::new(code, d, d2))
    }

    /// Generate a batch of transient rows.
    pub fn arb_foos(max: usize) -> impl Strategy<Value = Vec<Foo>> {
        prop::collection::vec(arb_foo(), 0..=max)
    }

    /// Generate an exclusive `(above, below)` range with `above < below`.
    pub fn arb_code_range(max: i32) -> impl Strategy<Value = (i32, i32)> {
        (-1i32..max, 1i32..max).prop_map(|(above, width)| (above, above.saturating_add(width)))
    }

    /// Generate a filter over codes `0..max` or ids `1..=max`.
    pub fn arb_filter(max: i32) -> impl Strategy<Value = Filter> {
        prop_oneof![
            Just(Filter::All),
            (0..max).prop_map(Filter::CodeEq),
            arb_code_range(max).prop_map(|(above, below)| Filter::code_between(above, below)),
            prop::collection::vec(1i64..=i64::from(max), 0..20)
                .prop_map(|ids| Filter::id_in(ids.into_iter().map(FooId::new))),
        ]
    }

    /// Generate a valid small configuration.
    pub fn arb_valid_config() -> impl Strategy<Value = BenchConfig> {
        (50usize..400, 1usize..50).prop_flat_map(|(seed_rows, in_clause_max)| {
            let max = seed_rows as i32;
            (-1i32..max - 1).prop_flat_map(move |above| {
                (above + 1..=max).prop_map(move |below| BenchConfig {
                    seed_rows,
                    update_above: above,
                    update_below: below,
                    in_clause_max,
                    parameter_limit: Some(in_clause_max),
                    ..BenchConfig::default()
                })
            })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fresh backends and sessions for tests.

    use super::*;

    /// Small configuration that keeps scenario tests fast: 300 rows,
    /// update range `(100, 200)` (99 rows), chunks of 25.
    pub fn small_config() -> BenchConfig {
        BenchConfig {
            seed_rows: 300,
            update_above: 100,
            update_below: 200,
            in_clause_max: 25,
            parameter_limit: Some(25),
            ..BenchConfig::default()
        }
    }

    pub fn memory_session(parameter_limit: Option<usize>) -> Session<MemoryStore> {
        Session::new(MemoryStore::new().with_parameter_limit(parameter_limit))
    }

    pub fn sqlite_session(parameter_limit: Option<usize>) -> Session<SqliteStore> {
        let store = SqliteStore::open_in_memory()
            .expect("open in-memory SQLite")
            .with_parameter_limit(parameter_limit);
        Session::new(store)
    }

    /// A session with an open transaction and `count` committed-looking rows
    /// with codes `0..count`. The cache is empty.
    pub fn seeded_session<B: StorageBackend>(backend: B, count: i32) -> (Session<B>, Vec<Foo>) {
        let mut session = Session::new(backend);
        session.begin().expect("begin");
        let mut rows: Vec<Foo> = (0..count).map(Foo::seeded).collect();
        session.persist_all(&mut rows).expect("persist rows");
        session.clear();
        (session, rows)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for bulkbench-specific validation.

    use super::*;

    /// Assert that a BenchResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &BenchResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a BenchResult is an assertion failure.
    #[track_caller]
    pub fn assert_assertion_error<T: std::fmt::Debug>(result: &BenchResult<T>) {
        match result {
            Err(BenchError::Assertion(_)) => {}
            other => panic!("Expected Assertion error, got: {:?}", other),
        }
    }

    /// Assert that a BenchResult is a parameter-limit rejection.
    #[track_caller]
    pub fn assert_parameter_limit<T: std::fmt::Debug>(result: &BenchResult<T>, limit: usize) {
        match result {
            Err(BenchError::Storage(StorageError::ParameterLimitExceeded { limit: l, .. }))
                if *l == limit => {}
            other => panic!(
                "Expected ParameterLimitExceeded with limit {}, got: {:?}",
                limit, other
            ),
        }
    }

    /// Assert that storage holds exactly the codes `0..n`, once each.
    #[track_caller]
    pub fn assert_codes_exact<B: StorageBackend>(backend: &B, n: i32) {
        let mut codes: Vec<i32> = backend
            .select(&Filter::All)
            .expect("select all")
            .into_iter()
            .map(|f| f.code)
            .collect();
        codes.sort_unstable();
        let expected: Vec<i32> = (0..n).collect();
        assert_eq!(codes, expected, "seeded codes are not exactly 0..{}", n);
    }

    /// Assert that exactly the rows with `above < code < below` carry
    /// `value` in `description` and everything else matches `seeded`.
    #[track_caller]
    pub fn assert_update_range<B: StorageBackend>(
        backend: &B,
        seeded: &[Foo],
        (above, below): (i32, i32),
        value: &str,
    ) {
        let stored = backend.select(&Filter::All).expect("select all");
        assert_eq!(stored.len(), seeded.len(), "row count changed");
        for (original, current) in seeded.iter().zip(stored.iter()) {
            assert_eq!(original.id, current.id);
            if above < original.code && original.code < below {
                assert_eq!(current.description, value, "code {} not updated", original.code);
            } else {
                assert_eq!(
                    current.description, original.description,
                    "code {} changed outside the range",
                    original.code
                );
            }
            assert_eq!(current.description2, original.description2);
            assert_eq!(current.code, original.code);
        }
    }

    /// Assert that the backend holds no rows.
    #[track_caller]
    pub fn assert_empty<B: StorageBackend>(backend: &B) {
        let rows = backend.select(&Filter::All).expect("select all");
        assert!(rows.is_empty(), "expected empty store, found {} rows", rows.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_small_config_is_valid() {
        let config = fixtures::small_config();
        assertions::assert_ok(&config.validate());
        assert_eq!(config.expected_updated(), 99);
    }

    #[test]
    fn test_seeded_session_fixture() {
        let (session, rows) = fixtures::seeded_session(MemoryStore::new(), 10);
        assert_eq!(rows.len(), 10);
        assert_eq!(session.managed_count(), 0);
        assertions::assert_codes_exact(session.backend(), 10);
    }

    #[test]
    fn test_sqlite_session_fixture() {
        let (session, _) = fixtures::seeded_session(SqliteStore::open_in_memory().unwrap(), 5);
        assertions::assert_codes_exact(session.backend(), 5);
    }

    #[test]
    fn test_assert_empty_after_rollback() {
        let (mut session, _) = fixtures::seeded_session(MemoryStore::new(), 3);
        session.rollback().unwrap();
        assertions::assert_empty(session.backend());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn test_generated_configs_validate(config in generators::arb_valid_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn test_generated_ranges_are_ordered((above, below) in generators::arb_code_range(1000)) {
            prop_assert!(above < below);
        }

        #[test]
        fn test_generated_foos_are_transient(foo in generators::arb_foo()) {
            prop_assert!(foo.is_transient());
        }
    }
}
