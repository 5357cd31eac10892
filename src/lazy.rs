//! The on-demand query controller.
//!
//! A [`LazyQueryController`] never fetches on creation. Nothing runs until
//! [`Execute::run`] (or a refetch) is called; from then on it follows the same
//! automatic rules as [`QueryController`](crate::controller::QueryController).

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::controller::{Refetch, commit_cycle, render_cycle};
use crate::detector::{ChangeDetector, Cycle};
use crate::error::QueryError;
use crate::fetch::{ListenerId, RefetchHandle, Shared, VariablesUpdate};
use crate::operation::Operation;
use crate::options::QueryOptions;
use crate::snapshot::QuerySnapshot;
use crate::variables::Variables;

/// Starts a lazy query on demand.
pub struct Execute<V, T, E> {
    shared: Arc<Shared<V, T, E>>,
}

impl<V, T, E> Execute<V, T, E>
where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Fetches now. `Some(variables)` replaces the stored variables and keeps
    /// them in place of the host's on later cycles; `None` uses the stored
    /// ones.
    pub fn run(&self, variables: Option<V>) -> RefetchHandle<T, E> {
        let update = match variables {
            Some(variables) => VariablesUpdate::Pin(variables),
            None => VariablesUpdate::Keep,
        };
        self.shared.refetch(update)
    }
}

impl<V, T, E> Clone for Execute<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, T, E> fmt::Debug for Execute<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execute").finish_non_exhaustive()
    }
}

/// What the host reads after each lazy cycle.
#[derive(Debug, Clone)]
pub struct LazyQueryResult<V, T, E> {
    /// `true` while the current fetch has not settled. Never set before the
    /// first `execute`.
    pub loading: bool,
    /// Result of the last successful fetch, cleared when a new fetch begins.
    pub data: Option<T>,
    /// Failure of the last fetch, cleared when a new fetch begins.
    pub error: Option<E>,
    /// The `data` that was on display when the current fetch began.
    pub previous_data: Option<T>,
    /// `false` until the first `execute` or `refetch`.
    pub called: bool,
    /// Re-issues the query with the stored variables; also marks it called.
    pub refetch: Refetch<V, T, E>,
}

/// Controller that fetches only after an explicit `execute`.
pub struct LazyQueryController<V, T, E = QueryError> {
    shared: Arc<Shared<V, T, E>>,
    detector: ChangeDetector<V, T, E>,
    seen_fetches: u64,
}

impl<V, T, E> LazyQueryController<V, T, E>
where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates an idle controller: not loading, not called.
    pub fn new(operation: Operation<V, T, E>, options: QueryOptions<V, T, E>) -> Self {
        let snapshot = QuerySnapshot::new(false);
        Self {
            shared: Shared::new(operation, options.variables, options.callbacks, snapshot),
            detector: ChangeDetector::new(false),
            seen_fetches: 0,
        }
    }

    /// Render pass. Returns the execute entry point and the current result.
    pub fn render(
        &mut self,
        operation: &Operation<V, T, E>,
        options: QueryOptions<V, T, E>,
    ) -> (Execute<V, T, E>, LazyQueryResult<V, T, E>) {
        self.absorb_explicit_fetches(operation, &options);
        render_cycle(&self.shared, &mut self.detector, operation, options);
        (self.executor(), self.result())
    }

    /// Commit pass. See [`QueryController::commit`](crate::controller::QueryController::commit).
    pub fn commit(&mut self) {
        commit_cycle(&self.shared, &mut self.detector);
    }

    /// Runs [`render`](Self::render) and [`commit`](Self::commit) back to back.
    pub fn update(
        &mut self,
        operation: &Operation<V, T, E>,
        options: QueryOptions<V, T, E>,
    ) -> (Execute<V, T, E>, LazyQueryResult<V, T, E>) {
        self.absorb_explicit_fetches(operation, &options);
        render_cycle(&self.shared, &mut self.detector, operation, options);
        self.commit();
        (self.executor(), self.result())
    }

    // An execute already fetched with the variables it pinned. Record them as
    // committed so the next cycle does not fetch them a second time.
    fn absorb_explicit_fetches(
        &mut self,
        operation: &Operation<V, T, E>,
        options: &QueryOptions<V, T, E>,
    ) {
        let fetches = self.shared.explicit_fetches();
        if fetches == self.seen_fetches {
            return;
        }
        self.seen_fetches = fetches;
        if options.skip {
            return;
        }
        // Unpinned fetches leave the host's inputs as they were.
        if let Some(variables) = self.shared.pinned_variables() {
            self.detector.rebase(Cycle::new(operation.clone(), variables, false));
        }
    }

    #[must_use]
    pub fn result(&self) -> LazyQueryResult<V, T, E> {
        let QuerySnapshot {
            loading,
            data,
            error,
            previous_data,
        } = self.shared.snapshot();
        LazyQueryResult {
            loading,
            data,
            error,
            previous_data,
            called: self.shared.called(),
            refetch: Refetch::new(Arc::clone(&self.shared)),
        }
    }

    #[must_use]
    pub fn executor(&self) -> Execute<V, T, E> {
        Execute {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`Execute::run`].
    pub fn execute(&self, variables: Option<V>) -> RefetchHandle<T, E> {
        self.executor().run(variables)
    }

    #[must_use]
    pub fn called(&self) -> bool {
        self.shared.called()
    }

    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot<T, E> {
        self.shared.snapshot()
    }

    #[must_use]
    pub fn variables(&self) -> V {
        self.shared.variables()
    }

    /// See [`QueryController::on_change`](crate::controller::QueryController::on_change).
    pub fn on_change(
        &self,
        listener: impl Fn(&QuerySnapshot<T, E>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.on_change(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.remove_listener(id)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T, E>> {
        self.shared.subscribe()
    }

    #[must_use]
    pub fn changes(&self) -> WatchStream<QuerySnapshot<T, E>> {
        WatchStream::new(self.shared.subscribe())
    }
}

impl<V, T, E> LazyQueryController<V, T, E> {
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl<V, T, E> Drop for LazyQueryController<V, T, E> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl<V, T, E> fmt::Debug for LazyQueryController<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyQueryController")
            .field("scheduled", &self.detector.is_scheduled())
            .finish_non_exhaustive()
    }
}
