//! A scripted [`Opener`] that hands out [`FakeDatabase`] handles.
//!
//! Each opened fake is labelled with the connection string it was opened
//! with, so `get("replica-1")` finds the handle a [`ReplicaSet`] built for
//! that replica.
//!
//! [`ReplicaSet`]: isql_db::ReplicaSet

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use isql_core::{DbError, DbResult};
use isql_db::{Database, Opener};

use crate::fake::FakeDatabase;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens fakes, failing on the connection strings it was told to.
#[derive(Default)]
pub struct FakeOpener {
    failures: HashMap<String, DbError>,
    close_failures: HashMap<String, DbError>,
    attempts: Mutex<Vec<String>>,
    opened: Mutex<Vec<FakeDatabase>>,
}

impl FakeOpener {
    /// An opener that succeeds for every connection string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes opening `dsn` fail with `err`.
    #[must_use]
    pub fn fail_on(mut self, dsn: impl Into<String>, err: DbError) -> Self {
        self.failures.insert(dsn.into(), err);
        self
    }

    /// Makes the handle opened for `dsn` return `err` from `close`.
    #[must_use]
    pub fn fail_close_on(mut self, dsn: impl Into<String>, err: DbError) -> Self {
        self.close_failures.insert(dsn.into(), err);
        self
    }

    /// Every connection string passed to `open`, in call order, including
    /// the ones that failed.
    pub fn attempts(&self) -> Vec<String> {
        lock(&self.attempts).clone()
    }

    /// Every handle successfully opened, in call order.
    pub fn opened(&self) -> Vec<FakeDatabase> {
        lock(&self.opened).clone()
    }

    /// The most recent handle opened for `dsn`.
    pub fn get(&self, dsn: &str) -> Option<FakeDatabase> {
        lock(&self.opened)
            .iter()
            .rev()
            .find(|db| db.label() == dsn)
            .cloned()
    }
}

#[async_trait::async_trait]
impl Opener for FakeOpener {
    async fn open(&self, driver: &str, dsn: &str) -> DbResult<Arc<dyn Database>> {
        lock(&self.attempts).push(dsn.to_string());
        if let Some(err) = self.failures.get(dsn) {
            return Err(err.clone());
        }
        let db = FakeDatabase::with_driver(dsn, driver);
        if let Some(err) = self.close_failures.get(dsn) {
            db.set_close_error(Some(err.clone()));
        }
        lock(&self.opened).push(db.clone());
        Ok(Arc::new(db))
    }
}
