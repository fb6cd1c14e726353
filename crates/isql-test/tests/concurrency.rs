//! Concurrent use of a shared `ReplicaSet`.

use std::sync::Arc;

use isql_db::{
    Context, Database, Executor, ReplicaPicker, ReplicaSet, SeededPicker, ThreadRngPicker,
};
use isql_test::{assert_hit_distribution, FakeDatabase, Method};

fn shared_set(
    replicas: usize,
    picker: Box<dyn ReplicaPicker>,
) -> (Arc<ReplicaSet>, FakeDatabase, Vec<FakeDatabase>) {
    let primary = FakeDatabase::new("primary");
    let fakes: Vec<FakeDatabase> = (0..replicas)
        .map(|i| FakeDatabase::new(format!("replica-{i}")))
        .collect();
    let set = ReplicaSet::from_parts(
        Arc::new(primary.clone()) as Arc<dyn Database>,
        fakes
            .iter()
            .map(|f| Arc::new(f.clone()) as Arc<dyn Database>)
            .collect(),
        picker,
    );
    (Arc::new(set), primary, fakes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reads_stay_uniform() {
    let (set, primary, replicas) = shared_set(4, Box::new(ThreadRngPicker));

    let mut handles = Vec::new();
    for _ in 0..64 {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                set.query_row("SELECT label", &[]).await.scan().unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let hits: Vec<usize> = replicas.iter().map(FakeDatabase::reads).collect();
    assert_eq!(hits.iter().sum::<usize>(), 6400);
    assert_hit_distribution(&hits, 0.15);
    assert!(primary.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_seeded_picker_under_contention() {
    let (set, _primary, replicas) = shared_set(3, Box::new(SeededPicker::new(2024)));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            for _ in 0..100 {
                set.query_ctx(&ctx, "SELECT 1", &[]).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let hits: Vec<usize> = replicas.iter().map(|r| r.count(Method::QueryCtx)).collect();
    assert_eq!(hits.iter().sum::<usize>(), 3200);
    assert_hit_distribution(&hits, 0.15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_traffic() {
    let (set, primary, replicas) = shared_set(2, Box::new(ThreadRngPicker));

    let mut handles = Vec::new();
    for task in 0..40 {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                if task % 2 == 0 {
                    set.exec("UPDATE t SET x = x + 1", &[]).await.unwrap();
                } else {
                    set.query("SELECT x FROM t", &[]).await.unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(primary.writes(), 500);
    assert_eq!(primary.reads(), 0);
    assert_eq!(replicas.iter().map(FakeDatabase::reads).sum::<usize>(), 500);
    assert!(replicas.iter().all(|r| r.writes() == 0));
}
