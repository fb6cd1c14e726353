//! The [`Opener`] capability: turning a driver name and connection string
//! into a [`Database`] handle.

use std::sync::Arc;

use isql_core::DbResult;

use crate::connection::Database;

/// Opens database handles.
///
/// A failed open must not leak: anything the implementation allocated
/// before the failure is released before the error is returned, and a
/// handle is never returned together with an error.
///
/// Whether `open` actually connects is up to the driver. Pool-backed drivers
/// may defer the first connection until the handle is used.
#[async_trait::async_trait]
pub trait Opener: Send + Sync {
    /// Opens a handle using `driver` with the driver-specific `dsn`.
    async fn open(&self, driver: &str, dsn: &str) -> DbResult<Arc<dyn Database>>;
}

#[async_trait::async_trait]
impl<T: Opener + ?Sized> Opener for Arc<T> {
    async fn open(&self, driver: &str, dsn: &str) -> DbResult<Arc<dyn Database>> {
        (**self).open(driver, dsn).await
    }
}
