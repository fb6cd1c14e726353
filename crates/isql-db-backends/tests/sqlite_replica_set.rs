//! Integration tests for a replica set over real SQLite databases.
//!
//! Every `:memory:` open is a separate database, so each member gets a
//! `marker` table naming itself. Reads reveal which member served them and
//! writes can be counted per member.

#![cfg(feature = "sqlite")]

use isql_core::{DatabaseSettings, DbError};
use isql_db::{collect_records, Context, Executor, ReplicaSet, SeededPicker, Value};
use isql_db_backends::{open_replica_set, DriverOpener};

async fn marked_set(replicas: usize) -> ReplicaSet {
    let dsns = vec![":memory:"; replicas];
    let set = ReplicaSet::open_with_picker(
        &DriverOpener,
        Box::new(SeededPicker::new(42)),
        "sqlite",
        ":memory:",
        &dsns,
    )
    .await
    .unwrap();

    mark(set.primary(), "primary").await;
    for (i, replica) in set.replicas().into_iter().enumerate() {
        mark(replica, &format!("replica-{i}")).await;
    }
    set
}

async fn mark(db: &dyn Executor, label: &str) {
    db.exec("CREATE TABLE marker (label TEXT NOT NULL)", &[])
        .await
        .unwrap();
    db.exec("INSERT INTO marker (label) VALUES (?)", &[Value::from(label)])
        .await
        .unwrap();
    db.exec("CREATE TABLE writes (n INTEGER)", &[]).await.unwrap();
}

async fn served_by(set: &ReplicaSet) -> String {
    set.query_row("SELECT label FROM marker", &[])
        .await
        .scan()
        .unwrap()
        .get("label")
        .unwrap()
}

async fn write_count(db: &dyn Executor) -> i64 {
    db.query_row("SELECT COUNT(*) AS n FROM writes", &[])
        .await
        .scan()
        .unwrap()
        .get("n")
        .unwrap()
}

#[tokio::test]
async fn test_writes_land_on_primary() {
    let set = marked_set(2).await;
    for i in 0..5 {
        set.exec("INSERT INTO writes (n) VALUES (?)", &[Value::from(i)])
            .await
            .unwrap();
    }
    assert_eq!(write_count(set.primary()).await, 5);
    for replica in set.replicas() {
        assert_eq!(write_count(replica).await, 0);
    }
}

#[tokio::test]
async fn test_reads_spread_over_replicas() {
    let set = marked_set(3).await;
    let mut seen = std::collections::HashMap::new();
    for _ in 0..300 {
        *seen.entry(served_by(&set).await).or_insert(0) += 1;
    }
    assert!(!seen.contains_key("primary"));
    assert_eq!(seen.len(), 3, "{seen:?}");
    assert!(seen.values().all(|&n| n > 60), "{seen:?}");
}

#[tokio::test]
async fn test_reads_without_replicas_use_primary() {
    let set = marked_set(0).await;
    for _ in 0..10 {
        assert_eq!(served_by(&set).await, "primary");
    }
    let mut rows = set.query("SELECT label FROM marker", &[]).await.unwrap();
    let records = collect_records(rows.as_mut()).unwrap();
    assert_eq!(records[0].get::<String>("label").unwrap(), "primary");
}

#[tokio::test]
async fn test_replica_errors_pass_through() {
    let set = marked_set(1).await;
    let row = set
        .query_row("SELECT label FROM marker WHERE label = 'nobody'", &[])
        .await;
    assert_eq!(row.scan(), Err(DbError::NoRows));

    let err = set.query("SELECT * FROM missing_table", &[]).await.err().unwrap();
    assert!(matches!(err, DbError::DatabaseError(_)), "{err:?}");
}

#[tokio::test]
async fn test_context_passes_through() {
    let set = marked_set(1).await;
    let ctx = Context::background().with_cancel();
    ctx.cancel();
    assert_eq!(
        set.exec_ctx(&ctx, "INSERT INTO writes (n) VALUES (1)", &[])
            .await
            .unwrap_err(),
        DbError::Cancelled
    );
    let row = set.query_row_ctx(&ctx, "SELECT label FROM marker", &[]).await;
    assert_eq!(row.scan(), Err(DbError::Cancelled));
}

#[tokio::test]
async fn test_close_closes_every_member() {
    let set = marked_set(2).await;
    set.close().await.unwrap();
    assert_eq!(
        set.primary().exec("SELECT 1", &[]).await.unwrap_err(),
        DbError::ConnectionClosed
    );
    for replica in set.replicas() {
        assert_eq!(
            replica.exec("SELECT 1", &[]).await.unwrap_err(),
            DbError::ConnectionClosed
        );
    }
}

#[tokio::test]
async fn test_bad_replica_path_fails_construction() {
    let err = ReplicaSet::open(
        &DriverOpener,
        "sqlite",
        ":memory:",
        &[":memory:", "/nonexistent-dir/sub/replica.db"],
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, DbError::OperationalError(_)), "{err:?}");
}

#[tokio::test]
async fn test_unknown_driver_fails_construction() {
    let settings = DatabaseSettings {
        driver: "oracle".into(),
        ..DatabaseSettings::default()
    };
    let err = open_replica_set(&settings).await.err().unwrap();
    assert_eq!(err, DbError::UnknownDriver("oracle".into()));
}
