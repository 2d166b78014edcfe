//! Typed query vocabulary shared by every storage backend.
//!
//! Filters, field assignments and bulk commands are plain data. Backends
//! either evaluate them in-process ([`Filter::matches`]) or render them to
//! their own statement language.

use crate::{Foo, FooId};
use serde::{Deserialize, Serialize};

/// Row predicate over `Foo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Every row.
    All,
    /// `code = value`
    CodeEq(i32),
    /// `above < code < below`
    CodeBetween { above: i32, below: i32 },
    /// `id IN (...)`
    IdIn(Vec<FooId>),
}

impl Filter {
    /// Exclusive code range, the shape every update scenario uses.
    pub fn code_between(above: i32, below: i32) -> Self {
        Self::CodeBetween { above, below }
    }

    pub fn id_in(ids: impl IntoIterator<Item = FooId>) -> Self {
        Self::IdIn(ids.into_iter().collect())
    }

    /// Evaluate the predicate against an in-process record.
    ///
    /// A transient record never matches `IdIn`.
    pub fn matches(&self, foo: &Foo) -> bool {
        match self {
            Self::All => true,
            Self::CodeEq(code) => foo.code == *code,
            Self::CodeBetween { above, below } => *above < foo.code && foo.code < *below,
            Self::IdIn(ids) => foo.id.is_some_and(|id| ids.contains(&id)),
        }
    }

    /// Length of the parameter list this filter binds. For `IdIn` this is the
    /// IN-list size, which is what engines cap.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::All => 0,
            Self::CodeEq(_) => 1,
            Self::CodeBetween { .. } => 2,
            Self::IdIn(ids) => ids.len(),
        }
    }
}

/// Single-column `SET` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignment {
    Description(String),
    Description2(String),
}

impl Assignment {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Description(_) => "description",
            Self::Description2(_) => "description2",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Description(v) | Self::Description2(v) => v,
        }
    }

    /// Write the assigned value into `foo`. Returns whether the field changed.
    pub fn apply(&self, foo: &mut Foo) -> bool {
        let (field, value) = match self {
            Self::Description(v) => (&mut foo.description, v),
            Self::Description2(v) => (&mut foo.description2, v),
        };
        if *field == *value {
            return false;
        }
        field.clone_from(value);
        true
    }
}

/// Storage-level command that mutates rows without loading them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkCommand {
    Update { set: Assignment, filter: Filter },
    Delete { filter: Filter },
}

impl BulkCommand {
    pub fn update(set: Assignment, filter: Filter) -> Self {
        Self::Update { set, filter }
    }

    pub fn delete(filter: Filter) -> Self {
        Self::Delete { filter }
    }

    /// `DELETE` without a predicate.
    pub fn delete_all() -> Self {
        Self::delete(Filter::All)
    }

    pub fn filter(&self) -> &Filter {
        match self {
            Self::Update { filter, .. } | Self::Delete { filter } => filter,
        }
    }
}
