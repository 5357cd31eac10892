// Integration tests for latest-wins behavior

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lastcall::mock::MockOperation;
use lastcall::prelude::*;
use parking_lot::Mutex;
use tokio::time::{Duration, timeout};

type Vars = BTreeMap<String, i32>;

fn vars(a: i32) -> Vars {
    BTreeMap::from([("a".to_string(), a)])
}

async fn flush() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_later_fetch_wins_when_earlier_resolves_last() {
    let mock = MockOperation::<Vars, String>::new();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let options = |a: i32| {
        let completed = completed.clone();
        QueryOptions::new(vars(a)).on_completed(move |data: &String| {
            completed.lock().push(data.clone());
        })
    };

    let mut query = QueryController::new(mock.operation(), options(1));
    query.update(&mock.operation(), options(1));

    mock.resolve(0, "X".to_string()).expect("call 0 pending");
    flush().await;

    let result = query.update(&mock.operation(), options(1));
    assert!(!result.loading);
    assert_eq!(result.data.as_deref(), Some("X"));
    assert_eq!(result.error, None);
    assert_eq!(result.previous_data, None);

    // Variables change while nothing is in flight
    query.update(&mock.operation(), options(2));
    // And again before the {a: 2} call settles
    let result = query.update(&mock.operation(), options(3));
    assert!(result.loading);
    assert_eq!(result.data, None);
    assert_eq!(mock.call_count(), 3);

    mock.resolve(2, "Z".to_string()).expect("call 2 pending");
    flush().await;
    mock.resolve(1, "Y".to_string()).expect("call 1 pending");
    flush().await;

    let snapshot = query.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.data(), Some(&"Z".to_string()));
    assert_eq!(*completed.lock(), vec!["X".to_string(), "Z".to_string()]);
}

#[tokio::test]
async fn test_earlier_outcome_never_shows_while_later_pending() {
    let mock = MockOperation::<Vars, String>::new();
    let mut query = QueryController::new(mock.operation(), QueryOptions::new(vars(1)));
    query.update(&mock.operation(), QueryOptions::new(vars(1)));
    query.update(&mock.operation(), QueryOptions::new(vars(2)));

    mock.resolve(0, "stale".to_string()).expect("call 0 pending");
    flush().await;

    let snapshot = query.snapshot();
    assert!(snapshot.loading);
    assert_eq!(snapshot.data(), None);

    mock.resolve(1, "fresh".to_string()).expect("call 1 pending");
    flush().await;
    assert_eq!(query.snapshot().data(), Some(&"fresh".to_string()));
}

#[tokio::test]
async fn test_stale_failure_is_discarded_without_callback() {
    let mock = MockOperation::<Vars, String>::new();
    let errors = Arc::new(AtomicUsize::new(0));
    let options = |a: i32| {
        let errors = errors.clone();
        QueryOptions::new(vars(a)).on_error(move |_: &QueryError| {
            errors.fetch_add(1, Ordering::SeqCst);
        })
    };

    let mut query = QueryController::new(mock.operation(), options(1));
    query.update(&mock.operation(), options(1));
    query.update(&mock.operation(), options(2));

    mock.resolve(1, "ok".to_string()).expect("call 1 pending");
    mock.reject(0, QueryError::failed("late")).expect("call 0 pending");
    flush().await;

    let snapshot = query.snapshot();
    assert_eq!(snapshot.data(), Some(&"ok".to_string()));
    assert_eq!(snapshot.error(), None);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_superseded_refetch_resolves_without_its_outcome() {
    let mock = MockOperation::<Vars, String>::new();
    let mut query = QueryController::new(mock.operation(), QueryOptions::new(vars(1)));
    query.update(&mock.operation(), QueryOptions::new(vars(1)));

    let first = query.refetch();
    let second = query.refetch_replace(vars(9));
    assert_eq!(mock.variables(2), Some(vars(9)));

    mock.resolve(1, "first".to_string()).expect("call 1 pending");
    let snapshot = first.await;
    assert!(snapshot.loading);
    assert_eq!(snapshot.data(), None);

    mock.resolve(2, "second".to_string()).expect("call 2 pending");
    let snapshot = second.await;
    assert_eq!(snapshot.data(), Some(&"second".to_string()));
}

#[tokio::test]
async fn test_superseded_operation_receives_cancellation() {
    let started = Arc::new(AtomicUsize::new(0));
    let operation = Operation::cancellable({
        let started = started.clone();
        move |a: i32, cancel| {
            let call = started.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    cancel.cancelled().await;
                    Err(QueryError::Cancelled)
                } else {
                    Ok(a * 100)
                }
            }
        }
    });

    let mut query = QueryController::new(operation.clone(), QueryOptions::new(1));
    query.update(&operation, QueryOptions::new(1));
    let mut changes = query.subscribe();
    query.update(&operation, QueryOptions::new(2));

    let settled = timeout(Duration::from_secs(1), changes.wait_for(|s| !s.loading))
        .await
        .expect("fetch should settle")
        .expect("controller alive")
        .clone();
    assert_eq!(settled.data(), Some(&200));
    assert_eq!(settled.error(), None);

    flush().await;
    assert_eq!(query.snapshot().error(), None);
}

#[tokio::test]
async fn test_panicking_operation_leaves_fetch_pending() {
    let operation = Operation::new(|fail: bool| async move {
        if fail {
            panic!("operation blew up");
        }
        Ok::<_, QueryError>(1)
    });

    let query = QueryController::new(operation, QueryOptions::new(false));
    let snapshot = query.refetch_replace(true).await;

    assert!(snapshot.loading);
    assert_eq!(snapshot.data(), None);
    assert_eq!(snapshot.error(), None);
}

#[tokio::test]
async fn test_operation_panicking_before_its_future_leaves_fetch_pending() {
    let operation = Operation::new(|fail: bool| {
        assert!(!fail, "operation rejected its input");
        async move { Ok::<_, QueryError>(1) }
    });

    let query = QueryController::new(operation, QueryOptions::new(false));
    let handle = query.refetch_replace(true);
    assert!(handle.is_finished());

    let snapshot = handle.await;
    assert!(snapshot.loading);
    assert_eq!(snapshot.data(), None);
    assert_eq!(query.snapshot(), snapshot);

    // The controller keeps working afterwards
    let snapshot = query.refetch_replace(false).await;
    assert_eq!(snapshot.data(), Some(&1));
}
