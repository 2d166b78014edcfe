//! Scoped transaction guard for isolated scenarios.

use crate::{Session, StorageBackend};
use bulkbench_core::BenchResult;
use std::ops::{Deref, DerefMut};

/// Begins a transaction on construction and rolls it back when dropped.
///
/// Construction also flushes and clears the session so the scenario starts
/// from a cold cache. Rollback happens on every exit path: normal scope end,
/// an early `?` return, or a panic unwinding through the scenario. Use
/// [`ResetFixture::finish`] to observe a rollback error instead of having it
/// logged.
pub struct ResetFixture<'s, B: StorageBackend> {
    session: &'s mut Session<B>,
    done: bool,
}

impl<'s, B: StorageBackend> ResetFixture<'s, B> {
    pub fn begin(session: &'s mut Session<B>) -> BenchResult<Self> {
        session.begin()?;
        let mut fixture = Self {
            session,
            done: false,
        };
        fixture.session.flush()?;
        fixture.session.clear();
        Ok(fixture)
    }

    /// Roll back now and report the outcome.
    pub fn finish(mut self) -> BenchResult<()> {
        self.done = true;
        self.session.rollback()
    }
}

impl<B: StorageBackend> Deref for ResetFixture<'_, B> {
    type Target = Session<B>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<B: StorageBackend> DerefMut for ResetFixture<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<B: StorageBackend> Drop for ResetFixture<'_, B> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match self.session.is_active() {
            Ok(true) => {
                if let Err(e) = self.session.rollback() {
                    tracing::warn!(error = %e, "fixture rollback failed");
                }
            }
            // Committed or rolled back by the scenario itself.
            Ok(false) => self.session.clear(),
            Err(e) => tracing::warn!(error = %e, "fixture could not read transaction state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use bulkbench_core::{Filter, Foo};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn insert_rows(session: &mut Session<MemoryStore>, n: i32) {
        let mut rows: Vec<Foo> = (0..n).map(Foo::seeded).collect();
        session.persist_all(&mut rows).unwrap();
    }

    #[test]
    fn test_drop_rolls_back() {
        let mut session = Session::new(MemoryStore::new());
        {
            let mut fixture = ResetFixture::begin(&mut session).unwrap();
            insert_rows(&mut fixture, 10);
            assert_eq!(fixture.query(&Filter::All).unwrap().len(), 10);
        }
        assert_eq!(session.backend().row_count().unwrap(), 0);
        assert!(!session.is_active().unwrap());
        assert_eq!(session.managed_count(), 0);
    }

    #[test]
    fn test_early_return_rolls_back() {
        fn failing(session: &mut Session<MemoryStore>) -> BenchResult<()> {
            let mut fixture = ResetFixture::begin(session)?;
            insert_rows(&mut fixture, 3);
            fixture.single_result(&Filter::All)?;
            Ok(())
        }

        let mut session = Session::new(MemoryStore::new());
        assert!(failing(&mut session).is_err());
        assert_eq!(session.backend().row_count().unwrap(), 0);
    }

    #[test]
    fn test_panic_rolls_back() {
        let mut session = Session::new(MemoryStore::new());
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut fixture = ResetFixture::begin(&mut session).unwrap();
            insert_rows(&mut fixture, 5);
            panic!("scenario failed");
        }));
        assert!(result.is_err());
        assert_eq!(session.backend().row_count().unwrap(), 0);
    }

    #[test]
    fn test_finish_reports_and_skips_drop() {
        let mut session = Session::new(MemoryStore::new());
        let mut fixture = ResetFixture::begin(&mut session).unwrap();
        insert_rows(&mut fixture, 2);
        fixture.finish().unwrap();
        assert_eq!(session.backend().row_count().unwrap(), 0);
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut session = Session::new(MemoryStore::new());
        session.begin().unwrap();
        assert!(ResetFixture::begin(&mut session).is_err());
    }
}
