//! Table seeding and reset.

use bulkbench_core::{AssertionError, BenchResult, BulkCommand, ConfigError, Filter, Foo};
use bulkbench_storage::{Session, StorageBackend};

/// Insert `count` rows with codes `0..count` and random descriptions.
///
/// The session is flushed and cleared afterwards so the next read goes to
/// storage. Returns the rows as inserted, ids set, in code order.
pub fn seed<B: StorageBackend>(session: &mut Session<B>, count: usize) -> BenchResult<Vec<Foo>> {
    let count = i32::try_from(count).map_err(|_| ConfigError::InvalidValue {
        field: "seed_rows".to_string(),
        value: count.to_string(),
        reason: "row codes are 32-bit".to_string(),
    })?;
    let mut rows: Vec<Foo> = (0..count).map(Foo::seeded).collect();
    session.persist_all(&mut rows)?;
    session.flush()?;
    session.clear();
    tracing::debug!(rows = rows.len(), "seeded");
    Ok(rows)
}

/// Delete every row and drop the cache. Returns the deleted count.
pub fn reset_rows<B: StorageBackend>(session: &mut Session<B>) -> BenchResult<u64> {
    let deleted = session.execute(&BulkCommand::delete_all())?;
    session.clear();
    Ok(deleted)
}

/// Check that storage holds exactly the codes `0..expected`, once each.
pub fn check_seeded_codes<B: StorageBackend>(
    session: &mut Session<B>,
    expected: usize,
) -> BenchResult<()> {
    let mut codes: Vec<i32> = session.query(&Filter::All)?.iter().map(|f| f.code).collect();
    codes.sort_unstable();

    if codes.len() != expected {
        return Err(AssertionError::CodeSet {
            expected,
            reason: format!("found {} rows", codes.len()),
        }
        .into());
    }
    if let Some((position, code)) = codes
        .iter()
        .enumerate()
        .find(|&(i, &code)| i64::from(code) != i as i64)
    {
        return Err(AssertionError::CodeSet {
            expected,
            reason: format!("position {} holds code {}", position, code),
        }
        .into());
    }
    Ok(())
}
