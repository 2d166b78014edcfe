//! Object layer: the session and its identity cache.
//!
//! A [`Session`] keeps one managed copy per loaded row together with the
//! snapshot last synchronized with storage. Callers work on their own `Foo`
//! values and hand changes back through [`Session::merge`]; [`Session::flush`]
//! writes every managed copy that differs from its snapshot.
//!
//! Bulk commands go straight to the backend and never touch the cache, so a
//! row that is cached (or held by the caller) keeps its old state until
//! [`Session::refresh`], [`Session::evict`] or [`Session::clear`]. Queries
//! return the cached state for rows that are already managed.

use crate::StorageBackend;
use bulkbench_core::{BenchResult, BulkCommand, Filter, Foo, FooId, StorageError};
use std::collections::HashMap;
use std::slice;

/// When pending changes are pushed to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Before every query and bulk command, and at commit.
    #[default]
    Auto,
    /// Only at commit and on explicit `flush`.
    Commit,
}

#[derive(Debug, Clone)]
struct Managed {
    state: Foo,
    /// Last state known to match storage.
    snapshot: Foo,
}

impl Managed {
    fn synced(row: Foo) -> Self {
        Self {
            state: row.clone(),
            snapshot: row,
        }
    }

    fn is_dirty(&self) -> bool {
        self.state != self.snapshot
    }
}

/// Unit of work over a storage backend.
#[derive(Debug)]
pub struct Session<B: StorageBackend> {
    backend: B,
    identity_map: HashMap<FooId, Managed>,
    flush_mode: FlushMode,
}

impl<B: StorageBackend> Session<B> {
    /// Create a session over a fresh backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            identity_map: HashMap::new(),
            flush_mode: FlushMode::default(),
        }
    }

    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    // === Transaction Control ===

    pub fn begin(&mut self) -> BenchResult<()> {
        self.backend.begin()
    }

    /// Flush pending changes, then commit.
    pub fn commit(&mut self) -> BenchResult<()> {
        self.flush()?;
        self.backend.commit()
    }

    /// Roll back and drop the cache, which may hold rolled-back state.
    pub fn rollback(&mut self) -> BenchResult<()> {
        let result = self.backend.rollback();
        self.clear();
        result
    }

    pub fn is_active(&self) -> BenchResult<bool> {
        self.backend.in_transaction()
    }

    fn require_transaction(&self) -> BenchResult<()> {
        if self.backend.in_transaction()? {
            Ok(())
        } else {
            Err(StorageError::NoTransaction.into())
        }
    }

    // === Object Lifecycle ===

    /// Insert a transient record and manage it. Sets `foo.id`.
    pub fn persist(&mut self, foo: &mut Foo) -> BenchResult<FooId> {
        self.persist_all(slice::from_mut(foo))?;
        foo.id.ok_or_else(|| {
            StorageError::InsertFailed {
                reason: "backend returned no id".to_string(),
            }
            .into()
        })
    }

    /// Insert a batch of transient records in one round trip.
    pub fn persist_all(&mut self, foos: &mut [Foo]) -> BenchResult<()> {
        self.require_transaction()?;
        if let Some(id) = foos.iter().find_map(|f| f.id) {
            return Err(StorageError::InsertFailed {
                reason: format!("entity {} is already persistent", id),
            }
            .into());
        }

        let ids = self.backend.insert(foos)?;
        if ids.len() != foos.len() {
            return Err(StorageError::InsertFailed {
                reason: format!("expected {} ids, backend returned {}", foos.len(), ids.len()),
            }
            .into());
        }

        for (foo, id) in foos.iter_mut().zip(ids) {
            foo.id = Some(id);
            self.identity_map.insert(id, Managed::synced(foo.clone()));
        }
        Ok(())
    }

    /// Copy `foo`'s state into the managed instance and return it.
    ///
    /// A transient record is persisted. A record that is not cached is loaded
    /// first so the flush can tell whether anything changed.
    pub fn merge(&mut self, foo: &Foo) -> BenchResult<Foo> {
        let Some(id) = foo.id else {
            let mut fresh = foo.clone();
            self.persist(&mut fresh)?;
            return Ok(fresh);
        };

        if let Some(managed) = self.identity_map.get_mut(&id) {
            managed.state.clone_from(foo);
            return Ok(managed.state.clone());
        }

        let row = self
            .backend
            .find(id)?
            .ok_or(StorageError::NotFound { id })?;
        self.identity_map.insert(
            id,
            Managed {
                state: foo.clone(),
                snapshot: row,
            },
        );
        Ok(foo.clone())
    }

    /// Reload `foo` from storage, discarding unsaved changes to it.
    ///
    /// The cached copy is replaced as well, so the refreshed state is what
    /// later queries return.
    pub fn refresh(&mut self, foo: &mut Foo) -> BenchResult<()> {
        let id = foo.id.ok_or(StorageError::Transient)?;
        let row = self
            .backend
            .find(id)?
            .ok_or(StorageError::NotFound { id })?;
        foo.clone_from(&row);
        self.identity_map.insert(id, Managed::synced(row));
        Ok(())
    }

    /// Look up by id, cache first.
    pub fn find(&mut self, id: FooId) -> BenchResult<Option<Foo>> {
        if let Some(managed) = self.identity_map.get(&id) {
            return Ok(Some(managed.state.clone()));
        }
        let Some(row) = self.backend.find(id)? else {
            return Ok(None);
        };
        self.identity_map.insert(id, Managed::synced(row.clone()));
        Ok(Some(row))
    }

    /// Stop managing one row. Unflushed changes to it are lost.
    pub fn evict(&mut self, id: FooId) -> bool {
        self.identity_map.remove(&id).is_some()
    }

    // === Queries ===

    /// Rows matching `filter` in id order. Rows already managed come back in
    /// their cached state.
    pub fn query(&mut self, filter: &Filter) -> BenchResult<Vec<Foo>> {
        self.auto_flush()?;
        let rows = self.backend.select(filter)?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.id else {
                return Err(StorageError::Transient.into());
            };
            let managed = self
                .identity_map
                .entry(id)
                .or_insert_with(|| Managed::synced(row));
            result.push(managed.state.clone());
        }
        Ok(result)
    }

    /// Exactly one row matching `filter`.
    pub fn single_result(&mut self, filter: &Filter) -> BenchResult<Foo> {
        let mut rows = self.query(filter)?;
        match rows.len() {
            0 => Err(StorageError::NoResult.into()),
            1 => rows.pop().ok_or_else(|| StorageError::NoResult.into()),
            count => Err(StorageError::NonUniqueResult { count }.into()),
        }
    }

    /// Run a bulk command against storage. The cache is left as it is.
    pub fn execute(&mut self, command: &BulkCommand) -> BenchResult<u64> {
        self.require_transaction()?;
        self.auto_flush()?;
        let affected = self.backend.execute(command)?;
        tracing::debug!(
            backend = self.backend.name(),
            affected,
            parameters = command.filter().parameter_count(),
            "bulk command executed"
        );
        Ok(affected)
    }

    // === Cache ===

    /// Write every dirty managed row in one round trip. Returns rows written.
    pub fn flush(&mut self) -> BenchResult<u64> {
        let mut dirty: Vec<Foo> = self
            .identity_map
            .values()
            .filter(|m| m.is_dirty())
            .map(|m| m.state.clone())
            .collect();
        if dirty.is_empty() {
            return Ok(0);
        }
        self.require_transaction()?;
        dirty.sort_unstable_by_key(|f| f.id);

        let written = self.backend.update(&dirty)?;
        for foo in dirty {
            if let Some(managed) = foo.id.and_then(|id| self.identity_map.get_mut(&id)) {
                managed.snapshot = foo;
            }
        }
        tracing::debug!(backend = self.backend.name(), written, "session flushed");
        Ok(written)
    }

    /// Drop every managed row. Unflushed changes are lost.
    pub fn clear(&mut self) {
        self.identity_map.clear();
    }

    pub fn contains(&self, id: FooId) -> bool {
        self.identity_map.contains_key(&id)
    }

    pub fn managed_count(&self) -> usize {
        self.identity_map.len()
    }

    /// Whether any managed row differs from storage.
    pub fn is_dirty(&self) -> bool {
        self.identity_map.values().any(Managed::is_dirty)
    }

    fn auto_flush(&mut self) -> BenchResult<()> {
        if self.flush_mode == FlushMode::Auto && self.is_dirty() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use bulkbench_core::{Assignment, BenchError};

    fn session_with(n: i32) -> Session<MemoryStore> {
        let mut session = Session::new(MemoryStore::new());
        session.begin().unwrap();
        let mut rows: Vec<Foo> = (0..n).map(Foo::seeded).collect();
        session.persist_all(&mut rows).unwrap();
        session.flush().unwrap();
        session.clear();
        session
    }

    fn set_updated(code: i32) -> BulkCommand {
        BulkCommand::update(
            Assignment::Description("UPDATED".to_string()),
            Filter::CodeEq(code),
        )
    }

    #[test]
    fn test_persist_assigns_id_and_manages() {
        let mut session = Session::new(MemoryStore::new());
        session.begin().unwrap();
        let mut foo = Foo::seeded(0);
        let id = session.persist(&mut foo).unwrap();
        assert_eq!(foo.id, Some(id));
        assert!(session.contains(id));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_writes_require_transaction() {
        let mut session = Session::new(MemoryStore::new());
        let mut foo = Foo::seeded(0);
        assert!(matches!(
            session.persist(&mut foo),
            Err(BenchError::Storage(StorageError::NoTransaction))
        ));
        assert!(matches!(
            session.execute(&BulkCommand::delete_all()),
            Err(BenchError::Storage(StorageError::NoTransaction))
        ));
    }

    #[test]
    fn test_merge_then_flush_writes_once() {
        let mut session = session_with(3);
        let mut foo = session.single_result(&Filter::CodeEq(1)).unwrap();
        foo.description = "UPDATED".to_string();
        session.merge(&foo).unwrap();
        assert!(session.is_dirty());

        assert_eq!(session.flush().unwrap(), 1);
        assert!(!session.is_dirty());
        assert_eq!(session.flush().unwrap(), 0);

        let id = foo.id.unwrap();
        let stored = session.backend().find(id).unwrap().unwrap();
        assert_eq!(stored.description, "UPDATED");
    }

    #[test]
    fn test_merge_detached_loads_snapshot() {
        let mut session = session_with(2);
        let mut foo = session.single_result(&Filter::CodeEq(0)).unwrap();
        session.clear();

        foo.description2 = "changed".to_string();
        session.merge(&foo).unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.flush().unwrap(), 1);
    }

    #[test]
    fn test_merge_missing_row_is_not_found() {
        let mut session = session_with(0);
        let ghost = Foo::seeded(0).with_id(FooId::new(404));
        assert!(matches!(
            session.merge(&ghost),
            Err(BenchError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_auto_flush_before_query() {
        let mut session = session_with(5);
        let mut rows = session.query(&Filter::All).unwrap();
        for row in rows.iter_mut() {
            row.description = "UPDATED".to_string();
            session.merge(row).unwrap();
        }
        let before = session.backend().stats();
        session.query(&Filter::CodeEq(4)).unwrap();
        let delta = session.backend().stats().since(&before);
        // One update round trip for the flush, one select.
        assert_eq!(delta.round_trips, 2);
        assert_eq!(delta.rows_written, 5);
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_commit_mode_defers_flush() {
        let mut session = session_with(2).with_flush_mode(FlushMode::Commit);
        let mut foo = session.single_result(&Filter::CodeEq(0)).unwrap();
        foo.description = "UPDATED".to_string();
        session.merge(&foo).unwrap();

        session.query(&Filter::All).unwrap();
        assert!(session.is_dirty());

        session.commit().unwrap();
        assert!(!session.is_dirty());
        let stored = session.backend().find(foo.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.description, "UPDATED");
    }

    #[test]
    fn test_bulk_update_leaves_handle_and_cache_stale() {
        let mut session = session_with(1);
        let mut handle = session.single_result(&Filter::CodeEq(0)).unwrap();

        assert_eq!(session.execute(&set_updated(0)).unwrap(), 1);
        assert_ne!(handle.description, "UPDATED");

        // The cached copy still wins over storage on re-query.
        let requeried = session.single_result(&Filter::CodeEq(0)).unwrap();
        assert_ne!(requeried.description, "UPDATED");

        session.refresh(&mut handle).unwrap();
        assert_eq!(handle.description, "UPDATED");
        let requeried = session.single_result(&Filter::CodeEq(0)).unwrap();
        assert_eq!(requeried.description, "UPDATED");
    }

    #[test]
    fn test_refresh_discards_unsaved_changes() {
        let mut session = session_with(1);
        let mut handle = session.single_result(&Filter::CodeEq(0)).unwrap();
        let original = handle.description.clone();
        handle.description = "local edit".to_string();
        session.merge(&handle).unwrap();

        session.refresh(&mut handle).unwrap();
        assert_eq!(handle.description, original);
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_refresh_transient_fails() {
        let mut session = session_with(0);
        let mut foo = Foo::seeded(0);
        assert!(matches!(
            session.refresh(&mut foo),
            Err(BenchError::Storage(StorageError::Transient))
        ));
    }

    #[test]
    fn test_evict_forces_storage_read() {
        let mut session = session_with(1);
        let handle = session.single_result(&Filter::CodeEq(0)).unwrap();
        session.execute(&set_updated(0)).unwrap();

        assert!(session.evict(handle.id.unwrap()));
        assert!(!session.evict(handle.id.unwrap()));
        let fresh = session.find(handle.id.unwrap()).unwrap().unwrap();
        assert_eq!(fresh.description, "UPDATED");
    }

    #[test]
    fn test_single_result_errors() {
        let mut session = session_with(3);
        assert!(matches!(
            session.single_result(&Filter::CodeEq(99)),
            Err(BenchError::Storage(StorageError::NoResult))
        ));
        assert!(matches!(
            session.single_result(&Filter::All),
            Err(BenchError::Storage(StorageError::NonUniqueResult { count: 3 }))
        ));
    }

    #[test]
    fn test_rollback_clears_cache() {
        let mut session = session_with(4);
        session.query(&Filter::All).unwrap();
        assert_eq!(session.managed_count(), 4);
        session.rollback().unwrap();
        assert_eq!(session.managed_count(), 0);
        assert!(!session.is_active().unwrap());
        assert_eq!(session.backend().row_count().unwrap(), 0);
    }
}
