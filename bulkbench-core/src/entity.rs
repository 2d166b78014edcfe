//! The `Foo` entity record and its identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Surrogate identifier assigned by the storage layer on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FooId(i64);

impl FooId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FooId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FooId> for i64 {
    fn from(id: FooId) -> Self {
        id.0
    }
}

/// The benchmarked entity: an identifier, an integer business key and two
/// free-text fields.
///
/// `id` is `None` until the record has been inserted. `code` is what every
/// scenario filters on; `description` is what every update scenario writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foo {
    pub id: Option<FooId>,
    pub code: i32,
    pub description: String,
    pub description2: String,
}

impl Foo {
    /// Create a transient record.
    pub fn new(code: i32, description: impl Into<String>, description2: impl Into<String>) -> Self {
        Self {
            id: None,
            code,
            description: description.into(),
            description2: description2.into(),
        }
    }

    /// Create a transient record with random unique text fields, as the
    /// seeding step does.
    pub fn seeded(code: i32) -> Self {
        Self::new(
            code,
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
        )
    }

    /// Attach a storage-assigned id.
    pub fn with_id(mut self, id: FooId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }
}
