// Integration tests for on-demand queries

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lastcall::mock::MockOperation;
use lastcall::prelude::*;

async fn flush() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_lazy_query_waits_for_execute() {
    let mock = MockOperation::<u32, String>::new();
    let mut lazy = LazyQueryController::new(mock.operation(), QueryOptions::new(1));

    for id in [1, 1, 2, 3] {
        let (_, result) = lazy.update(&mock.operation(), QueryOptions::new(id));
        assert!(!result.loading);
        assert!(!result.called);
    }
    assert_eq!(mock.call_count(), 0);

    // Execute picks up the host's latest variables
    let (execute, _) = lazy.update(&mock.operation(), QueryOptions::new(3));
    let handle = execute.run(None);
    assert_eq!(mock.variables(0), Some(3));

    let (_, result) = lazy.update(&mock.operation(), QueryOptions::new(3));
    assert!(result.called);
    assert!(result.loading);

    mock.resolve(0, "three".to_string()).expect("call 0 pending");
    let snapshot = handle.await;
    assert_eq!(snapshot.data(), Some(&"three".to_string()));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_repeated_execute_supersedes() {
    let mock = MockOperation::<u32, String>::new();
    let completed = Arc::new(AtomicUsize::new(0));
    let options = || {
        let completed = completed.clone();
        QueryOptions::new(0).on_completed(move |_: &String| {
            completed.fetch_add(1, Ordering::SeqCst);
        })
    };

    let mut lazy = LazyQueryController::new(mock.operation(), options());
    let (execute, _) = lazy.update(&mock.operation(), options());

    let first = execute.run(Some(1));
    let second = execute.run(Some(2));
    assert!(mock.was_cancelled(0));

    mock.resolve(1, "two".to_string()).expect("call 1 pending");
    mock.resolve(0, "one".to_string()).expect("call 0 pending");

    assert_eq!(second.await.data(), Some(&"two".to_string()));
    // The superseded call never shows its own outcome
    assert_ne!(first.await.data(), Some(&"one".to_string()));
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    // Executed variables stick across cycles
    lazy.update(&mock.operation(), options());
    assert_eq!(lazy.variables(), 2);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_refetch_marks_lazy_query_called() {
    let mock = MockOperation::<u32, String>::new();
    let mut lazy = LazyQueryController::new(mock.operation(), QueryOptions::new(5));
    let (_, result) = lazy.update(&mock.operation(), QueryOptions::new(5));

    let handle = result.refetch.run();
    assert!(lazy.called());
    mock.reject(0, QueryError::failed("down")).expect("call 0 pending");

    let snapshot = handle.await;
    assert_eq!(snapshot.error(), Some(&QueryError::failed("down")));
    assert_eq!(snapshot.data(), None);
}

#[tokio::test]
async fn test_called_lazy_query_follows_input_changes() {
    let mock = MockOperation::<u32, String>::new();
    let mut lazy = LazyQueryController::new(mock.operation(), QueryOptions::new(1));
    lazy.update(&mock.operation(), QueryOptions::new(1));

    let _handle = lazy.execute(None);
    mock.resolve(0, "one".to_string()).expect("call 0 pending");
    flush().await;

    let (_, result) = lazy.update(&mock.operation(), QueryOptions::new(2));
    assert!(result.loading);
    assert_eq!(result.previous_data.as_deref(), Some("one"));
    assert_eq!(mock.variables(1), Some(2));

    // Skipping still pauses a called lazy query
    let (_, result) = lazy.update(&mock.operation(), QueryOptions::new(2).skip(true));
    assert!(!result.loading);
    assert!(mock.was_cancelled(1));
}

#[tokio::test]
async fn test_dropped_lazy_query_ignores_execute() {
    let mock = MockOperation::<u32, String>::new();
    let mut lazy = LazyQueryController::new(mock.operation(), QueryOptions::new(1));
    let (execute, _) = lazy.update(&mock.operation(), QueryOptions::new(1));
    drop(lazy);

    let handle = execute.run(Some(4));
    assert!(handle.is_finished());
    let snapshot = handle.await;
    assert!(!snapshot.loading);
    assert_eq!(mock.call_count(), 0);
}
