//! Mock operation for testing.
//!
//! [`MockOperation`] records every call made through its [`Operation`] and
//! leaves each one pending until the test settles it. Calls can be settled in
//! any order, which makes out-of-order completion deterministic to test.
//!
//! # Example
//!
//! ```
//! use lastcall::mock::MockOperation;
//! use lastcall::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), lastcall::error::MockError> {
//! let mock = MockOperation::<u32, String>::new();
//! let mut controller = QueryController::new(mock.operation(), QueryOptions::new(1));
//! controller.update(&mock.operation(), QueryOptions::new(1));
//!
//! assert_eq!(mock.call_count(), 1);
//! assert_eq!(mock.variables(0), Some(1));
//!
//! let outcome = controller.refetch();
//! mock.resolve(1, "fresh".to_string())?;
//! let snapshot = outcome.await;
//! assert_eq!(snapshot.data(), Some(&"fresh".to_string()));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{MockError, QueryError};
use crate::operation::Operation;

struct MockCall<V, T, E> {
    variables: V,
    responder: Option<oneshot::Sender<Result<T, E>>>,
    cancel: CancellationToken,
}

/// A controllable operation that settles calls on demand.
///
/// Clones share the same call log and the same [`Operation`] identity, so a
/// controller sees no operation change when a test passes
/// [`operation()`](Self::operation) on every cycle.
pub struct MockOperation<V, T, E = QueryError> {
    calls: Arc<Mutex<Vec<MockCall<V, T, E>>>>,
    operation: Operation<V, T, E>,
}

impl<V, T, E> MockOperation<V, T, E>
where
    V: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a mock with an empty call log.
    #[must_use]
    pub fn new() -> Self {
        let calls: Arc<Mutex<Vec<MockCall<V, T, E>>>> = Arc::new(Mutex::new(Vec::new()));
        let operation = Operation::cancellable({
            let calls = calls.clone();
            move |variables: V, cancel: CancellationToken| {
                let (tx, rx) = oneshot::channel();
                calls.lock().push(MockCall {
                    variables,
                    responder: Some(tx),
                    cancel,
                });
                async move {
                    match rx.await {
                        Ok(outcome) => outcome,
                        // Mock dropped without settling: behave like an
                        // operation that never settles.
                        Err(_) => future::pending().await,
                    }
                }
            }
        });

        Self { calls, operation }
    }

    /// Returns the operation handle to pass to a controller.
    #[must_use]
    pub fn operation(&self) -> Operation<V, T, E> {
        self.operation.clone()
    }

    /// Returns the number of times the operation has been invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the variables passed to the call at `index`.
    #[must_use]
    pub fn variables(&self, index: usize) -> Option<V> {
        self.calls.lock().get(index).map(|call| call.variables.clone())
    }

    /// Returns `true` if the call at `index` has been superseded or its
    /// controller dropped.
    #[must_use]
    pub fn was_cancelled(&self, index: usize) -> bool {
        self.calls
            .lock()
            .get(index)
            .is_some_and(|call| call.cancel.is_cancelled())
    }

    /// Settles the call at `index` successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if no such call exists, it was already settled, or
    /// nothing awaits it anymore.
    pub fn resolve(&self, index: usize, data: T) -> Result<(), MockError> {
        self.settle(index, Ok(data))
    }

    /// Settles the call at `index` with a failure.
    ///
    /// # Errors
    ///
    /// Returns an error if no such call exists, it was already settled, or
    /// nothing awaits it anymore.
    pub fn reject(&self, index: usize, error: E) -> Result<(), MockError> {
        self.settle(index, Err(error))
    }

    fn settle(&self, index: usize, outcome: Result<T, E>) -> Result<(), MockError> {
        let responder = {
            let mut calls = self.calls.lock();
            let call = calls.get_mut(index).ok_or(MockError::UnknownCall(index))?;
            call.responder.take().ok_or(MockError::AlreadySettled(index))?
        };
        responder
            .send(outcome)
            .map_err(|_| MockError::Abandoned(index))
    }
}

impl<V, T, E> Default for MockOperation<V, T, E>
where
    V: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T, E> Clone for MockOperation<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
            operation: self.operation.clone(),
        }
    }
}

impl<V, T, E> fmt::Debug for MockOperation<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockOperation")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}
