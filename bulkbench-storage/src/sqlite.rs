//! Embedded SQLite backend.
//!
//! One `foo` table with an index on `code`. Filters render to `WHERE`
//! clauses with positional parameters; statements go through the
//! connection's prepared-statement cache. Transactions are explicit
//! `BEGIN`/`COMMIT`/`ROLLBACK`, so `in_transaction` is simply "not in
//! autocommit mode".

use crate::stats::{StatCounters, StoreStats};
use crate::{check_parameter_limit, StorageBackend};
use bulkbench_core::{BenchError, BenchResult, BulkCommand, Filter, Foo, FooId, StorageError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const ENGINE: &str = "sqlite";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS foo (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        code         INTEGER NOT NULL,
        description  TEXT    NOT NULL,
        description2 TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_foo_code ON foo (code);
";

const COLUMNS: &str = "id, code, description, description2";

/// SQLite storage backend.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    parameter_limit: Option<usize>,
    stats: StatCounters,
}

impl SqliteStore {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> BenchResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        Self::from_connection(conn)
    }

    /// Open (or create) a database file.
    pub fn open(path: &Path) -> BenchResult<Self> {
        let conn = Connection::open(path).map_err(backend_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(backend_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> BenchResult<Self> {
        conn.execute_batch(
            "PRAGMA synchronous = OFF;
             PRAGMA temp_store = MEMORY;
             PRAGMA cache_size = -65536;",
        )
        .map_err(backend_err)?;
        conn.execute_batch(SCHEMA).map_err(backend_err)?;
        Ok(Self {
            conn,
            parameter_limit: None,
            stats: StatCounters::default(),
        })
    }

    /// Enforce a parameter-list cap before statements reach SQLite.
    pub fn with_parameter_limit(mut self, limit: Option<usize>) -> Self {
        self.parameter_limit = limit;
        self
    }

    pub fn row_count(&self) -> BenchResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM foo", [], |row| row.get(0))
            .map_err(backend_err)?;
        Ok(count as usize)
    }

    fn transaction_statement(&self, sql: &str) -> BenchResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })?;
        self.stats.control();
        Ok(())
    }
}

impl StorageBackend for SqliteStore {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn begin(&self) -> BenchResult<()> {
        if !self.conn.is_autocommit() {
            return Err(StorageError::TransactionFailed {
                reason: "transaction already active".to_string(),
            }
            .into());
        }
        self.transaction_statement("BEGIN")
    }

    fn commit(&self) -> BenchResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction.into());
        }
        self.transaction_statement("COMMIT")
    }

    fn rollback(&self) -> BenchResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction.into());
        }
        self.transaction_statement("ROLLBACK")
    }

    fn in_transaction(&self) -> BenchResult<bool> {
        Ok(!self.conn.is_autocommit())
    }

    fn insert(&self, rows: &[Foo]) -> BenchResult<Vec<FooId>> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO foo (code, description, description2) VALUES (?1, ?2, ?3)")
            .map_err(backend_err)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(id) = row.id {
                return Err(StorageError::InsertFailed {
                    reason: format!("row already has id {}", id),
                }
                .into());
            }
            let rowid = stmt
                .insert(params![row.code, row.description, row.description2])
                .map_err(|e| StorageError::InsertFailed {
                    reason: e.to_string(),
                })?;
            ids.push(FooId::new(rowid));
        }
        self.stats.write(ids.len() as u64);
        Ok(ids)
    }

    fn find(&self, id: FooId) -> BenchResult<Option<Foo>> {
        let sql = format!("SELECT {COLUMNS} FROM foo WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql).map_err(backend_err)?;
        let row = stmt
            .query_row([id.get()], row_to_foo)
            .optional()
            .map_err(backend_err)?;
        self.stats.read(usize::from(row.is_some()));
        Ok(row)
    }

    fn select(&self, filter: &Filter) -> BenchResult<Vec<Foo>> {
        check_parameter_limit(self.parameter_limit, filter)?;
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT {COLUMNS} FROM foo{clause} ORDER BY id");
        let mut stmt = self.conn.prepare_cached(&sql).map_err(backend_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_foo)
            .map_err(backend_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend_err)?;
        self.stats.read(rows.len());
        Ok(rows)
    }

    fn update(&self, rows: &[Foo]) -> BenchResult<u64> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "UPDATE foo SET code = ?1, description = ?2, description2 = ?3 WHERE id = ?4",
            )
            .map_err(backend_err)?;
        let mut written = 0u64;
        for row in rows {
            let id = row.id.ok_or(StorageError::Transient)?;
            let changed = stmt
                .execute(params![row.code, row.description, row.description2, id.get()])
                .map_err(backend_err)?;
            if changed == 0 {
                return Err(StorageError::NotFound { id }.into());
            }
            written += changed as u64;
        }
        self.stats.write(written);
        Ok(written)
    }

    fn execute(&self, command: &BulkCommand) -> BenchResult<u64> {
        check_parameter_limit(self.parameter_limit, command.filter())?;
        let (clause, filter_values) = where_clause(command.filter());
        let (sql, values) = match command {
            BulkCommand::Update { set, .. } => {
                let mut values = Vec::with_capacity(filter_values.len() + 1);
                values.push(Value::Text(set.value().to_string()));
                values.extend(filter_values);
                (format!("UPDATE foo SET {} = ?{clause}", set.column()), values)
            }
            BulkCommand::Delete { .. } => (format!("DELETE FROM foo{clause}"), filter_values),
        };
        let affected = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(backend_err)? as u64;
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

fn row_to_foo(row: &Row<'_>) -> rusqlite::Result<Foo> {
    Ok(Foo {
        id: Some(FooId::new(row.get(0)?)),
        code: row.get(1)?,
        description: row.get(2)?,
        description2: row.get(3)?,
    })
}

/// Render a filter as ` WHERE ...` (empty for `All`) plus its bound values.
fn where_clause(filter: &Filter) -> (String, Vec<Value>) {
    match filter {
        Filter::All => (String::new(), Vec::new()),
        Filter::CodeEq(code) => (
            " WHERE code = ?".to_string(),
            vec![Value::Integer(i64::from(*code))],
        ),
        Filter::CodeBetween { above, below } => (
            " WHERE code > ? AND code < ?".to_string(),
            vec![
                Value::Integer(i64::from(*above)),
                Value::Integer(i64::from(*below)),
            ],
        ),
        Filter::IdIn(ids) if ids.is_empty() => (" WHERE 0".to_string(), Vec::new()),
        Filter::IdIn(ids) => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            (
                format!(" WHERE id IN ({placeholders})"),
                ids.iter().map(|id| Value::Integer(id.get())).collect(),
            )
        }
    }
}

fn backend_err(e: rusqlite::Error) -> BenchError {
    StorageError::Backend {
        engine: ENGINE,
        reason: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkbench_core::Assignment;

    fn seeded(n: i32) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows: Vec<Foo> = (0..n).map(Foo::seeded).collect();
        store.insert(&rows).unwrap();
        store
    }

    #[test]
    fn test_where_clause_rendering() {
        assert_eq!(where_clause(&Filter::All).0, "");
        assert_eq!(
            where_clause(&Filter::code_between(1, 5)).0,
            " WHERE code > ? AND code < ?"
        );
        let (sql, values) = where_clause(&Filter::id_in([FooId::new(1), FooId::new(2)]));
        assert_eq!(sql, " WHERE id IN (?, ?)");
        assert_eq!(values.len(), 2);
        assert_eq!(where_clause(&Filter::IdIn(Vec::new())).0, " WHERE 0");
    }

    #[test]
    fn test_insert_and_select_in_id_order() {
        let store = seeded(20);
        assert_eq!(store.row_count().unwrap(), 20);
        let rows = store.select(&Filter::code_between(4, 9)).unwrap();
        let codes: Vec<i32> = rows.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![5, 6, 7, 8]);
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_bulk_update_and_delete() {
        let store = seeded(50);
        let updated = store
            .execute(&BulkCommand::update(
                Assignment::Description("UPDATED".to_string()),
                Filter::code_between(10, 20),
            ))
            .unwrap();
        assert_eq!(updated, 9);
        let row = store.select(&Filter::CodeEq(15)).unwrap().remove(0);
        assert_eq!(row.description, "UPDATED");

        let deleted = store.execute(&BulkCommand::delete_all()).unwrap();
        assert_eq!(deleted, 50);
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_id_in_update() {
        let store = seeded(10);
        let ids: Vec<FooId> = store
            .select(&Filter::code_between(-1, 3))
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        let updated = store
            .execute(&BulkCommand::update(
                Assignment::Description2("x".to_string()),
                Filter::id_in(ids),
            ))
            .unwrap();
        assert_eq!(updated, 3);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = seeded(5);
        store.begin().unwrap();
        assert!(store.in_transaction().unwrap());
        store.execute(&BulkCommand::delete_all()).unwrap();
        let rows: Vec<Foo> = (0..3).map(Foo::seeded).collect();
        store.insert(&rows).unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction().unwrap());
        assert_eq!(store.row_count().unwrap(), 5);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let store = seeded(1);
        let ghost = Foo::seeded(0).with_id(FooId::new(999));
        assert!(matches!(
            store.update(&[ghost]),
            Err(BenchError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_find() {
        let store = seeded(2);
        let first = store.find(FooId::new(1)).unwrap().unwrap();
        assert_eq!(first.code, 0);
        assert!(store.find(FooId::new(77)).unwrap().is_none());
    }

    #[test]
    fn test_parameter_limit() {
        let store = seeded(3).with_parameter_limit(Some(2));
        let all_ids = Filter::id_in((1..=3).map(FooId::new));
        assert!(matches!(
            store.select(&all_ids),
            Err(BenchError::Storage(StorageError::ParameterLimitExceeded { limit: 2, got: 3 }))
        ));
    }

    #[test]
    fn test_file_backed_store_persists_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.begin().unwrap();
            store.insert(&[Foo::seeded(7)]).unwrap();
            store.commit().unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        let row = reopened.select(&Filter::CodeEq(7)).unwrap();
        assert_eq!(row.len(), 1);
    }
}
