//! Per-cycle query inputs.

use std::fmt;
use std::sync::Arc;

/// Callback invoked with a committed outcome.
pub type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Completion and error callbacks captured by a fetch when it starts.
pub(crate) struct Callbacks<T, E> {
    pub(crate) on_completed: Option<Callback<T>>,
    pub(crate) on_error: Option<Callback<E>>,
}

impl<T, E> Callbacks<T, E> {
    pub(crate) fn completed(&self, data: &T) {
        if let Some(on_completed) = &self.on_completed {
            on_completed(data);
        }
    }

    pub(crate) fn failed(&self, error: &E) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl<T, E> Clone for Callbacks<T, E> {
    fn clone(&self) -> Self {
        Self {
            on_completed: self.on_completed.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Inputs supplied by the host on every cycle.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use lastcall::options::QueryOptions;
/// use lastcall::error::QueryError;
///
/// let options: QueryOptions<_, String, QueryError> =
///     QueryOptions::new(BTreeMap::from([("id", 7)]))
///         .skip(false)
///         .on_completed(|data: &String| println!("loaded {data}"))
///         .on_error(|error: &QueryError| eprintln!("{error}"));
///
/// assert!(!options.skip);
/// ```
pub struct QueryOptions<V, T, E> {
    /// Variables passed to the operation.
    pub variables: V,
    /// Suppresses automatic fetching while `true`.
    pub skip: bool,
    pub(crate) callbacks: Callbacks<T, E>,
}

impl<V, T, E> QueryOptions<V, T, E> {
    /// Creates options with the given variables, not skipped, no callbacks.
    #[must_use]
    pub const fn new(variables: V) -> Self {
        Self {
            variables,
            skip: false,
            callbacks: Callbacks {
                on_completed: None,
                on_error: None,
            },
        }
    }

    /// Sets whether automatic fetching is suppressed.
    #[must_use]
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the callback invoked after each successful, non-stale fetch.
    #[must_use]
    pub fn on_completed(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.callbacks.on_completed = Some(Arc::new(f));
        self
    }

    /// Sets the callback invoked after each failed, non-stale fetch.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }
}

impl<V: Default, T, E> Default for QueryOptions<V, T, E> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: Clone, T, E> Clone for QueryOptions<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            variables: self.variables.clone(),
            skip: self.skip,
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<V: fmt::Debug, T, E> fmt::Debug for QueryOptions<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("variables", &self.variables)
            .field("skip", &self.skip)
            .field("on_completed", &self.callbacks.on_completed.is_some())
            .field("on_error", &self.callbacks.on_error.is_some())
            .finish()
    }
}
