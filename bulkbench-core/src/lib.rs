//! bulkbench Core - Entity Model
//!
//! The `Foo` record, the typed query vocabulary every backend understands,
//! error types and harness configuration. No storage logic lives here.

pub mod config;
pub mod entity;
pub mod error;
pub mod query;

pub use config::{BackendKind, BenchConfig, LogFormat, ReportFormat};
pub use entity::{Foo, FooId};
pub use error::{AssertionError, BenchError, BenchResult, ConfigError, StorageError};
pub use query::{Assignment, BulkCommand, Filter};

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// CodeBetween matches exactly the codes strictly inside the bounds.
        #[test]
        fn prop_code_between_matches_open_interval(
            above in -1000i32..1000,
            width in 0i32..500,
            code in -2000i32..2000,
        ) {
            let below = above + width;
            let foo = Foo::new(code, "d", "d2").with_id(FooId::new(1));
            let expected = above < code && code < below;
            prop_assert_eq!(Filter::code_between(above, below).matches(&foo), expected);
        }

        /// The derived update count agrees with counting matches over 0..seed_rows.
        #[test]
        fn prop_expected_updated_counts_matches(
            seed_rows in 1usize..400,
            above in -5i32..400,
            width in 1i32..400,
        ) {
            let config = BenchConfig {
                seed_rows,
                update_above: above,
                update_below: above + width,
                ..Default::default()
            };
            let filter = Filter::code_between(config.update_above, config.update_below);
            let counted = (0..seed_rows as i32)
                .filter(|code| filter.matches(&Foo::new(*code, "", "")))
                .count() as u64;
            prop_assert_eq!(config.expected_updated(), counted);
        }

        /// IdIn never matches a record whose id is outside the list.
        #[test]
        fn prop_id_in_membership(ids in prop::collection::vec(0i64..50, 0..20), candidate in 0i64..50) {
            let filter = Filter::id_in(ids.iter().copied().map(FooId::new));
            let foo = Foo::new(0, "d", "d2").with_id(FooId::new(candidate));
            prop_assert_eq!(filter.matches(&foo), ids.contains(&candidate));
        }
    }
}
