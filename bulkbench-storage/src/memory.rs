//! In-process transactional store.
//!
//! Rows live in a `BTreeMap` keyed by id, so scans come back in id order
//! without sorting. A transaction keeps an undo log that rollback replays in
//! reverse; the id sequence is never rolled back, matching database
//! sequences. Outside a transaction every write autocommits.

use crate::stats::{StatCounters, StoreStats};
use crate::{check_parameter_limit, StorageBackend};
use bulkbench_core::{BenchResult, BulkCommand, Filter, Foo, FooId, StorageError};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
enum Undo {
    Inserted(FooId),
    Replaced(Foo),
    Deleted(Foo),
}

#[derive(Debug)]
struct MemoryState {
    rows: BTreeMap<FooId, Foo>,
    next_id: i64,
    undo: Option<Vec<Undo>>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            undo: None,
        }
    }
}

impl MemoryState {
    fn record(&mut self, entry: Undo) {
        if let Some(log) = self.undo.as_mut() {
            log.push(entry);
        }
    }

    fn allocate_id(&mut self) -> FooId {
        let id = FooId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Rows matching `filter`, in id order. `IdIn` looks up each key instead of
    /// scanning.
    fn matching_ids(&self, filter: &Filter) -> Vec<FooId> {
        match filter {
            Filter::IdIn(ids) => {
                let mut hits: Vec<FooId> = ids
                    .iter()
                    .copied()
                    .filter(|id| self.rows.contains_key(id))
                    .collect();
                hits.sort_unstable();
                hits.dedup();
                hits
            }
            _ => self
                .rows
                .values()
                .filter(|row| filter.matches(row))
                .filter_map(|row| row.id)
                .collect(),
        }
    }
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    parameter_limit: Option<usize>,
    stats: StatCounters,
}

impl MemoryStore {
    /// Create an empty store with no parameter-list limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject filters whose parameter list is longer than `limit`, the way a
    /// database with an IN-list cap would.
    pub fn with_parameter_limit(mut self, limit: Option<usize>) -> Self {
        self.parameter_limit = limit;
        self
    }

    /// Number of committed or in-flight rows.
    pub fn row_count(&self) -> BenchResult<usize> {
        Ok(self.read()?.rows.len())
    }

    fn read(&self) -> BenchResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> BenchResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

impl StorageBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self) -> BenchResult<()> {
        let mut state = self.write()?;
        if state.undo.is_some() {
            return Err(StorageError::TransactionFailed {
                reason: "transaction already active".to_string(),
            }
            .into());
        }
        state.undo = Some(Vec::new());
        self.stats.control();
        Ok(())
    }

    fn commit(&self) -> BenchResult<()> {
        let mut state = self.write()?;
        if state.undo.take().is_none() {
            return Err(StorageError::NoTransaction.into());
        }
        self.stats.control();
        Ok(())
    }

    fn rollback(&self) -> BenchResult<()> {
        let mut state = self.write()?;
        let log = state.undo.take().ok_or(StorageError::NoTransaction)?;
        for entry in log.into_iter().rev() {
            match entry {
                Undo::Inserted(id) => {
                    state.rows.remove(&id);
                }
                Undo::Replaced(old) | Undo::Deleted(old) => {
                    if let Some(id) = old.id {
                        state.rows.insert(id, old);
                    }
                }
            }
        }
        self.stats.control();
        Ok(())
    }

    fn in_transaction(&self) -> BenchResult<bool> {
        Ok(self.read()?.undo.is_some())
    }

    fn insert(&self, rows: &[Foo]) -> BenchResult<Vec<FooId>> {
        let mut state = self.write()?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(id) = row.id {
                return Err(StorageError::InsertFailed {
                    reason: format!("row already has id {}", id),
                }
                .into());
            }
            let id = state.allocate_id();
            state.rows.insert(id, row.clone().with_id(id));
            state.record(Undo::Inserted(id));
            ids.push(id);
        }
        self.stats.write(ids.len() as u64);
        Ok(ids)
    }

    fn find(&self, id: FooId) -> BenchResult<Option<Foo>> {
        let state = self.read()?;
        let row = state.rows.get(&id).cloned();
        self.stats.read(usize::from(row.is_some()));
        Ok(row)
    }

    fn select(&self, filter: &Filter) -> BenchResult<Vec<Foo>> {
        check_parameter_limit(self.parameter_limit, filter)?;
        let state = self.read()?;
        let rows: Vec<Foo> = state
            .matching_ids(filter)
            .into_iter()
            .filter_map(|id| state.rows.get(&id).cloned())
            .collect();
        self.stats.read(rows.len());
        Ok(rows)
    }

    fn update(&self, rows: &[Foo]) -> BenchResult<u64> {
        let mut state = self.write()?;
        let mut written = 0u64;
        for row in rows {
            let id = row.id.ok_or(StorageError::Transient)?;
            let old = state
                .rows
                .insert(id, row.clone())
                .ok_or(StorageError::NotFound { id })?;
            state.record(Undo::Replaced(old));
            written += 1;
        }
        self.stats.write(written);
        Ok(written)
    }

    fn execute(&self, command: &BulkCommand) -> BenchResult<u64> {
        check_parameter_limit(self.parameter_limit, command.filter())?;
        let mut state = self.write()?;
        let ids = state.matching_ids(command.filter());
        let mut affected = 0u64;
        match command {
            BulkCommand::Update { set, .. } => {
                for id in ids {
                    let Some(row) = state.rows.get_mut(&id) else {
                        continue;
                    };
                    let old = row.clone();
                    // Matched rows count as affected even when the value is unchanged.
                    set.apply(row);
                    state.record(Undo::Replaced(old));
                    affected += 1;
                }
            }
            BulkCommand::Delete { .. } => {
                for id in ids {
                    if let Some(old) = state.rows.remove(&id) {
                        state.record(Undo::Deleted(old));
                        affected += 1;
                    }
                }
            }
        }
        self.stats.write(affected);
        Ok(affected)
    }

    fn parameter_limit(&self) -> Option<usize> {
        self.parameter_limit
    }

    fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }
}
