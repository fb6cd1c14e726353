//! Assertion helpers for routing and query-count tests.
//!
//! The routing helpers work on [`FakeDatabase`] logs: they check that a call
//! landed on exactly one member, through the method of the same name, and
//! that the others saw nothing. [`assert_num_queries`] and
//! [`assert_max_queries`] count calls made through a [`TestDatabase`] and are
//! the usual guard against accidental extra round trips.
//!
//! ## Example
//!
//! ```rust
//! use isql_db::{Database, Executor, ReplicaSet, SeededPicker};
//! use isql_test::assertions::assert_routed_only_to;
//! use isql_test::fake::{FakeDatabase, Method};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let primary = FakeDatabase::new("primary");
//! let replica = FakeDatabase::new("replica");
//! let set = ReplicaSet::from_parts(
//!     Arc::new(primary.clone()) as Arc<dyn Database>,
//!     vec![Arc::new(replica.clone()) as Arc<dyn Database>],
//!     Box::new(SeededPicker::new(1)),
//! );
//! set.exec("UPDATE t SET x = 1", &[]).await.unwrap();
//! assert_routed_only_to(Method::Exec, &primary, &[&replica], 1);
//! # });
//! ```

use std::collections::HashMap;
use std::future::Future;

use crate::fake::{FakeDatabase, Method};
#[cfg(feature = "sqlite")]
use crate::test_database::TestDatabase;

/// Asserts that `target` received exactly `expected` calls, all of them
/// `method`, and that none of `others` received any call.
///
/// # Panics
///
/// Panics if `target` saw a different number of calls, any call of another
/// method, or if any of `others` saw a call.
pub fn assert_routed_only_to(
    method: Method,
    target: &FakeDatabase,
    others: &[&FakeDatabase],
    expected: usize,
) {
    let calls = target.calls();
    assert_eq!(
        calls.len(),
        expected,
        "Expected {expected} calls on {}, but {} were made: {calls:?}",
        target.label(),
        calls.len()
    );
    for call in &calls {
        assert_eq!(
            call.method,
            method,
            "Expected only {method:?} on {}, got {:?}",
            target.label(),
            call.method
        );
    }
    for other in others {
        let stray = other.calls();
        assert!(
            stray.is_empty(),
            "Expected no calls on {}, but got {stray:?}",
            other.label()
        );
    }
}

/// Returns how many read calls each fake received, keyed by label.
pub fn hit_counts(members: &[&FakeDatabase]) -> HashMap<String, usize> {
    members
        .iter()
        .map(|db| (db.label().to_string(), db.reads()))
        .collect()
}

/// Asserts that `hits` are spread evenly: every count is within
/// `tolerance` (a fraction such as `0.2`) of the mean.
///
/// # Panics
///
/// Panics if `hits` is empty or any count strays further than `tolerance`
/// from the mean.
#[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
pub fn assert_hit_distribution(hits: &[usize], tolerance: f64) {
    assert!(!hits.is_empty(), "Expected at least one hit count");
    let total: usize = hits.iter().sum();
    let mean = total as f64 / hits.len() as f64;
    for (index, &count) in hits.iter().enumerate() {
        let deviation = (count as f64 - mean).abs() / mean;
        assert!(
            deviation <= tolerance,
            "Member {index} got {count} of {total} reads ({:.1}% off the mean {mean:.1}): {hits:?}",
            deviation * 100.0
        );
    }
}

/// Asserts that exactly `expected_count` calls go through `db` during the
/// async closure.
///
/// Resets the counter on the [`TestDatabase`] before running the closure.
///
/// # Panics
///
/// Panics if the number of queries does not match `expected_count`.
#[cfg(feature = "sqlite")]
pub async fn assert_num_queries<F, Fut>(db: &TestDatabase, expected_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    db.reset_query_count();
    f().await;
    let actual = db.query_count();
    assert_eq!(
        actual, expected_count,
        "Expected {expected_count} SQL queries, but {actual} were executed"
    );
}

/// Asserts that at most `max_count` calls go through `db` during the async
/// closure.
///
/// # Panics
///
/// Panics if more than `max_count` queries are executed.
#[cfg(feature = "sqlite")]
pub async fn assert_max_queries<F, Fut>(db: &TestDatabase, max_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    db.reset_query_count();
    f().await;
    let actual = db.query_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} SQL queries, but {actual} were executed"
    );
}
