//! bulkbench Harness - Timed Bulk Strategy Scenarios
//!
//! Seeds a `foo` table, then times alternative ways of finding one row and
//! of updating a code range, plus a demonstration that bulk updates leave
//! already fetched rows stale until refreshed. Each scenario is rolled back
//! when it ends.

pub mod report;
pub mod runner;
pub mod scenario;
pub mod seed;
pub mod telemetry;

pub use report::{Measurement, Report};
pub use runner::{run_configured, Harness, ScenarioKind};
pub use scenario::{
    select_and_filter, stale_entry_after_update, update_same_type, verify_update, FilterStrategy,
    UpdateStrategy, UpdateTarget,
};
pub use seed::{check_seeded_codes, reset_rows, seed};
pub use telemetry::init_tracing;
