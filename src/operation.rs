//! The user-supplied asynchronous operation.
//!
//! An [`Operation`] is a shared handle to an async function from variables to
//! `Result<T, E>`. Controllers compare operations by identity: clones of one
//! handle are the same operation, while two handles built from identical
//! closures are different operations.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;

type Call<V, T, E> = dyn Fn(V, CancellationToken) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

/// Shared, identity-comparable async operation.
///
/// # Example
///
/// ```
/// use lastcall::operation::Operation;
/// use lastcall::error::QueryError;
///
/// // An operation taking variables
/// let user = Operation::new(|id: u32| async move {
///     Ok::<_, QueryError>(format!("user-{id}"))
/// });
///
/// // An operation without variables
/// let health = Operation::without_variables(|| async { Ok::<_, QueryError>(true) });
///
/// assert!(user.ptr_eq(&user.clone()));
/// # let _ = health;
/// ```
pub struct Operation<V, T, E = QueryError> {
    call: Arc<Call<V, T, E>>,
}

impl<V, T, E> Operation<V, T, E>
where
    V: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wraps an async function taking the query variables.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            call: Arc::new(move |variables: V, _cancel: CancellationToken| f(variables).boxed()),
        }
    }

    /// Wraps an async function that also receives a cancellation signal.
    ///
    /// The signal fires once the fetch is superseded by a newer one or the
    /// controller is dropped. Honouring it is optional: a stale outcome is
    /// discarded either way.
    ///
    /// # Example
    ///
    /// ```
    /// use lastcall::operation::Operation;
    /// use lastcall::error::QueryError;
    ///
    /// let search = Operation::cancellable(|term: String, cancel| async move {
    ///     tokio::select! {
    ///         () = cancel.cancelled() => Err(QueryError::Cancelled),
    ///         () = tokio::time::sleep(std::time::Duration::from_millis(5)) => {
    ///             Ok(vec![term])
    ///         }
    ///     }
    /// });
    /// # let _ = search;
    /// ```
    pub fn cancellable<F, Fut>(f: F) -> Self
    where
        F: Fn(V, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            call: Arc::new(move |variables: V, cancel: CancellationToken| {
                f(variables, cancel).boxed()
            }),
        }
    }
}

impl<V, T, E> Operation<V, T, E> {
    /// Returns `true` if both handles refer to the same operation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }

    /// Starts the operation. The closure runs synchronously; the returned
    /// future carries the asynchronous part.
    pub(crate) fn call(
        &self,
        variables: V,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<T, E>> {
        (self.call)(variables, cancel)
    }
}

impl<T, E> Operation<(), T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wraps an async function that takes no variables.
    pub fn without_variables<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(move |()| f())
    }
}

impl<V, T, E> Clone for Operation<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<V, T, E> fmt::Debug for Operation<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("call", &Arc::as_ptr(&self.call).cast::<()>())
            .finish()
    }
}
