//! The eager query controller.
//!
//! A [`QueryController`] tracks one logical query. The host drives it once
//! per cycle, and it fetches automatically on creation and whenever the
//! operation, the variables, or the skip flag change.
//!
//! # Host cycle
//!
//! Hosts with separate render and effect phases call [`render`] (any number
//! of times) followed by [`commit`]. Hosts with a single phase call
//! [`update`], which does both.
//!
//! ```
//! use std::collections::BTreeMap;
//! use lastcall::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let lookup = Operation::new(|vars: BTreeMap<&'static str, u32>| async move {
//!     Ok::<_, QueryError>(vars["id"] * 10)
//! });
//! let options = || QueryOptions::new(BTreeMap::from([("id", 4)]));
//!
//! let mut controller = QueryController::new(lookup.clone(), options());
//! let result = controller.update(&lookup, options());
//! assert!(result.loading);
//!
//! let settled = result.refetch.run().await;
//! assert_eq!(settled.data, Some(40));
//! # }
//! ```
//!
//! [`render`]: QueryController::render
//! [`commit`]: QueryController::commit
//! [`update`]: QueryController::update

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::detector::{ChangeDetector, Cycle, Decision};
use crate::error::QueryError;
use crate::fetch::{ListenerId, RefetchHandle, Shared, VariablesUpdate};
use crate::operation::Operation;
use crate::options::QueryOptions;
use crate::snapshot::QuerySnapshot;
use crate::variables::Variables;

/// Re-issue capability handed to the host with every result.
pub struct Refetch<V, T, E> {
    shared: Arc<Shared<V, T, E>>,
}

impl<V, T, E> Refetch<V, T, E>
where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(shared: Arc<Shared<V, T, E>>) -> Self {
        Self { shared }
    }

    /// Re-runs the operation with the stored variables.
    pub fn run(&self) -> RefetchHandle<T, E> {
        self.shared.refetch(VariablesUpdate::Keep)
    }

    /// Merges `patch` into the stored variables, stores the result, and
    /// re-runs the operation with it.
    pub fn with(&self, patch: V::Patch) -> RefetchHandle<T, E> {
        self.shared.refetch(VariablesUpdate::Merge(patch))
    }

    /// Replaces the stored variables wholesale and re-runs the operation.
    pub fn replace(&self, variables: V) -> RefetchHandle<T, E> {
        self.shared.refetch(VariablesUpdate::Replace(variables))
    }
}

impl<V, T, E> Clone for Refetch<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, T, E> fmt::Debug for Refetch<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refetch").finish_non_exhaustive()
    }
}

/// What the host reads after each cycle.
#[derive(Debug, Clone)]
pub struct QueryResult<V, T, E> {
    /// `true` while the current fetch has not settled.
    pub loading: bool,
    /// Result of the last successful fetch, cleared when a new fetch begins.
    pub data: Option<T>,
    /// Failure of the last fetch, cleared when a new fetch begins.
    pub error: Option<E>,
    /// The `data` that was on display when the current fetch began.
    pub previous_data: Option<T>,
    /// Re-issues the query, optionally with new variables.
    pub refetch: Refetch<V, T, E>,
}

impl<V, T, E> QueryResult<V, T, E> {
    pub(crate) fn from_parts(snapshot: QuerySnapshot<T, E>, refetch: Refetch<V, T, E>) -> Self {
        let QuerySnapshot {
            loading,
            data,
            error,
            previous_data,
        } = snapshot;
        Self {
            loading,
            data,
            error,
            previous_data,
            refetch,
        }
    }
}

impl<V, T: Clone, E: Clone> QueryResult<V, T, E> {
    /// Returns the snapshot fields without the refetch handle.
    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot<T, E> {
        QuerySnapshot {
            loading: self.loading,
            data: self.data.clone(),
            error: self.error.clone(),
            previous_data: self.previous_data.clone(),
        }
    }
}

/// Controller that fetches automatically on creation and on input change.
///
/// Dropping the controller invalidates any fetch in flight: its outcome is
/// never committed and its cancellation signal fires.
pub struct QueryController<V, T, E = QueryError> {
    shared: Arc<Shared<V, T, E>>,
    detector: ChangeDetector<V, T, E>,
}

impl<V, T, E> QueryController<V, T, E>
where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a controller. Nothing runs until the first cycle is committed;
    /// the initial snapshot is already `loading` unless `options.skip` is set.
    pub fn new(operation: Operation<V, T, E>, options: QueryOptions<V, T, E>) -> Self {
        let snapshot = QuerySnapshot::new(!options.skip);
        Self {
            shared: Shared::new(operation, options.variables, options.callbacks, snapshot),
            detector: ChangeDetector::new(true),
        }
    }

    /// Render pass: compares the inputs against the last committed cycle and
    /// applies the pending state if a fetch is due. Starts nothing.
    pub fn render(
        &mut self,
        operation: &Operation<V, T, E>,
        options: QueryOptions<V, T, E>,
    ) -> QueryResult<V, T, E> {
        render_cycle(&self.shared, &mut self.detector, operation, options);
        self.result()
    }

    /// Commit pass: starts the fetch scheduled by the preceding render, if
    /// any. Calling it again without a new render starts nothing.
    pub fn commit(&mut self) {
        commit_cycle(&self.shared, &mut self.detector);
    }

    /// Runs [`render`](Self::render) and [`commit`](Self::commit) back to back.
    pub fn update(
        &mut self,
        operation: &Operation<V, T, E>,
        options: QueryOptions<V, T, E>,
    ) -> QueryResult<V, T, E> {
        render_cycle(&self.shared, &mut self.detector, operation, options);
        self.commit();
        self.result()
    }

    /// Returns the current facade without running a cycle.
    #[must_use]
    pub fn result(&self) -> QueryResult<V, T, E> {
        QueryResult::from_parts(self.shared.snapshot(), self.refetcher())
    }

    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot<T, E> {
        self.shared.snapshot()
    }

    /// Returns the variables the next `refetch()` would use.
    #[must_use]
    pub fn variables(&self) -> V {
        self.shared.variables()
    }

    /// Returns a cloneable handle for re-issuing the query.
    #[must_use]
    pub fn refetcher(&self) -> Refetch<V, T, E> {
        Refetch::new(Arc::clone(&self.shared))
    }

    /// See [`Refetch::run`].
    pub fn refetch(&self) -> RefetchHandle<T, E> {
        self.refetcher().run()
    }

    /// See [`Refetch::with`].
    pub fn refetch_with(&self, patch: V::Patch) -> RefetchHandle<T, E> {
        self.refetcher().with(patch)
    }

    /// See [`Refetch::replace`].
    pub fn refetch_replace(&self, variables: V) -> RefetchHandle<T, E> {
        self.refetcher().replace(variables)
    }

    /// Registers a listener called after every committed state change.
    ///
    /// Listeners run outside the controller's locks and may call back into
    /// it, e.g. to trigger a new host cycle. When a listener causes a newer
    /// change, the listeners after it receive only the newer snapshot.
    pub fn on_change(
        &self,
        listener: impl Fn(&QuerySnapshot<T, E>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.on_change(Arc::new(listener))
    }

    /// Unregisters a listener added with [`on_change`](Self::on_change).
    /// Returns `false` if it was already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.remove_listener(id)
    }

    /// Returns a receiver mirroring every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T, E>> {
        self.shared.subscribe()
    }

    /// Stream of snapshots, starting with the current one.
    #[must_use]
    pub fn changes(&self) -> WatchStream<QuerySnapshot<T, E>> {
        WatchStream::new(self.shared.subscribe())
    }
}

impl<V, T, E> QueryController<V, T, E> {
    /// Tears the controller down: the fetch in flight is invalidated and
    /// later refetches do nothing. Dropping the controller does the same.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl<V, T, E> Drop for QueryController<V, T, E> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl<V: fmt::Debug, T, E> fmt::Debug for QueryController<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryController")
            .field("scheduled", &self.detector.is_scheduled())
            .finish_non_exhaustive()
    }
}

/// Render pass shared by the eager and lazy controllers.
pub(crate) fn render_cycle<V, T, E>(
    shared: &Shared<V, T, E>,
    detector: &mut ChangeDetector<V, T, E>,
    operation: &Operation<V, T, E>,
    options: QueryOptions<V, T, E>,
) where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let QueryOptions {
        variables,
        skip,
        callbacks,
    } = options;
    shared.adopt(operation, &callbacks);

    // Variables pinned by a lazy `execute` win over the host's.
    let variables = shared.pinned_variables().unwrap_or(variables);
    let changed = detector.variables_changed(&variables);
    let cycle = Cycle::new(operation.clone(), variables.clone(), skip);

    match detector.evaluate(cycle, shared.called()) {
        Decision::Fetch => shared.prepare(variables),
        Decision::Reschedule => shared.retarget(variables),
        decision => {
            if decision == (Decision::Pause { entering: true }) {
                shared.pause();
            }
            // Keep the stored variables current for a later explicit fetch,
            // but never overwrite ones a refetch merged in.
            if changed {
                shared.retarget(variables);
            } else {
                tracing::trace!("query inputs unchanged");
            }
        }
    }
}

/// Commit pass shared by the eager and lazy controllers.
pub(crate) fn commit_cycle<V, T, E>(
    shared: &Arc<Shared<V, T, E>>,
    detector: &mut ChangeDetector<V, T, E>,
) where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    if detector.commit() {
        // Automatic fetches have no awaiting caller.
        let _detached = shared.fetch(true);
    }
}
