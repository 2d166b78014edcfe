//! Error types for bulkbench operations

use crate::FooId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: Foo with id {id}")]
    NotFound { id: FooId },

    #[error("Operation requires a persistent entity, but the entity has no id")]
    Transient,

    #[error("Insert failed: {reason}")]
    InsertFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("No active transaction")]
    NoTransaction,

    #[error("Query returned no result")]
    NoResult,

    #[error("Query returned {count} results where exactly one was expected")]
    NonUniqueResult { count: usize },

    #[error("Parameter list has {got} entries, backend limit is {limit}")]
    ParameterLimitExceeded { limit: usize, got: usize },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("{engine} error: {reason}")]
    Backend { engine: &'static str, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Scenario outcome checks that did not hold.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssertionError {
    #[error("{scenario}: expected {expected} affected rows, got {actual}")]
    AffectedRows {
        scenario: String,
        expected: u64,
        actual: u64,
    },

    #[error("{scenario}: no row with code {code}")]
    MissingMatch { scenario: String, code: i32 },

    #[error("{scenario}: {field} of {id} is {actual:?}, expected {expected:?}")]
    FieldMismatch {
        scenario: String,
        id: FooId,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{scenario}: handle {id} already reflects a bulk update it was never refreshed from")]
    UnexpectedlyFresh { scenario: String, id: FooId },

    #[error("Seeded codes are not exactly 0..{expected}: {reason}")]
    CodeSet { expected: usize, reason: String },
}

/// Master error type for all bulkbench errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BenchError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionError),
}

/// Result type alias for bulkbench operations.
pub type BenchResult<T> = Result<T, BenchError>;

// =============================================================================
// TESTS
// =============================================================================
