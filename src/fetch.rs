//! The fetch procedure and the state a controller shares with its handles.
//!
//! A fetch runs in three steps:
//!
//! 1. A new [`InvocationToken`] is issued, superseding any fetch in flight.
//! 2. Unless the pending state was already applied during the host's render
//!    pass, `data` moves to `previous_data` and the snapshot turns `loading`.
//! 3. The operation runs on a spawned task. When it settles, its outcome is
//!    committed only if its token is still current; otherwise it is dropped
//!    without touching state or invoking callbacks.
//!
//! Every committed change is mirrored into a [`watch`] channel while the
//! state lock is held, then delivered to `on_change` listeners after the lock
//! is released. Each mirrored change bumps a version; a delivery stops as soon
//! as a newer change has been published, so a listener that re-enters the
//! controller never leaves later listeners on an outdated snapshot.

use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::operation::Operation;
use crate::options::Callbacks;
use crate::snapshot::QuerySnapshot;
use crate::token::{InvocationToken, TokenSource};
use crate::variables::Variables;

pub(crate) type Listener<T, E> = Arc<dyn Fn(&QuerySnapshot<T, E>) + Send + Sync>;

/// Identifies a registered `on_change` listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// How an explicit fetch changes the stored variables.
pub(crate) enum VariablesUpdate<V: Variables> {
    Keep,
    Merge(V::Patch),
    Replace(V),
    /// Replace and take precedence over host-supplied variables from now on.
    Pin(V),
}

struct QueryState<V, T, E> {
    snapshot: QuerySnapshot<T, E>,
    variables: V,
    pinned: Option<V>,
    operation: Operation<V, T, E>,
    callbacks: Callbacks<T, E>,
    tokens: TokenSource,
    explicit_fetches: u64,
    published: u64,
    called: bool,
    disposed: bool,
}

pub(crate) struct Shared<V, T, E> {
    state: Mutex<QueryState<V, T, E>>,
    mirror: watch::Sender<QuerySnapshot<T, E>>,
    listeners: Mutex<Vec<(ListenerId, Listener<T, E>)>>,
    next_listener: AtomicU64,
}

impl<V, T, E> Shared<V, T, E>
where
    V: Variables,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        operation: Operation<V, T, E>,
        variables: V,
        callbacks: Callbacks<T, E>,
        snapshot: QuerySnapshot<T, E>,
    ) -> Arc<Self> {
        let (mirror, _) = watch::channel(snapshot.clone());
        Arc::new(Self {
            state: Mutex::new(QueryState {
                snapshot,
                variables,
                pinned: None,
                operation,
                callbacks,
                tokens: TokenSource::new(),
                explicit_fetches: 0,
                published: 0,
                called: false,
                disposed: false,
            }),
            mirror,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        })
    }

    pub(crate) fn snapshot(&self) -> QuerySnapshot<T, E> {
        self.state.lock().snapshot.clone()
    }

    pub(crate) fn called(&self) -> bool {
        self.state.lock().called
    }

    /// Number of `refetch`/`execute` calls accepted so far.
    pub(crate) fn explicit_fetches(&self) -> u64 {
        self.state.lock().explicit_fetches
    }

    pub(crate) fn variables(&self) -> V {
        self.state.lock().variables.clone()
    }

    pub(crate) fn pinned_variables(&self) -> Option<V> {
        self.state.lock().pinned.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T, E>> {
        self.mirror.subscribe()
    }

    pub(crate) fn on_change(&self, listener: Listener<T, E>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Adopts the operation and callbacks supplied by the latest host cycle.
    pub(crate) fn adopt(&self, operation: &Operation<V, T, E>, callbacks: &Callbacks<T, E>) {
        let mut state = self.state.lock();
        state.operation = operation.clone();
        state.callbacks = callbacks.clone();
    }

    /// Render-phase pending transition for an automatic fetch.
    ///
    /// Whatever is in flight is invalidated right away so it cannot commit
    /// between the render and the fetch actually starting.
    pub(crate) fn prepare(&self, variables: V) {
        let mut state = self.state.lock();
        state.tokens.invalidate();
        state.variables = variables;
        state.snapshot.begin();
        self.mirror_locked(&mut state);
    }

    /// Stores newer host variables without fetching. Also points an already
    /// scheduled automatic fetch at them.
    pub(crate) fn retarget(&self, variables: V) {
        self.state.lock().variables = variables;
    }

    /// Render-phase transition into the skipped rest state.
    pub(crate) fn pause(&self) {
        let mut state = self.state.lock();
        state.tokens.invalidate();
        state.snapshot.pause();
        self.mirror_locked(&mut state);
        tracing::debug!(generation = state.tokens.generation(), "query paused");
    }

    /// Explicit fetch: `refetch` and `execute` entry points.
    pub(crate) fn refetch(self: &Arc<Self>, update: VariablesUpdate<V>) -> RefetchHandle<T, E> {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return RefetchHandle::ready(state.snapshot.clone());
            }
            match update {
                VariablesUpdate::Keep => {}
                VariablesUpdate::Merge(patch) => {
                    state.variables = state.variables.merge(patch);
                }
                VariablesUpdate::Replace(variables) => state.variables = variables,
                VariablesUpdate::Pin(variables) => {
                    state.pinned = Some(variables.clone());
                    state.variables = variables;
                }
            }
            // Once pinned, explicit changes move the pin along.
            if state.pinned.is_some() {
                state.pinned = Some(state.variables.clone());
            }
            state.called = true;
            state.explicit_fetches += 1;
        }
        self.fetch(false)
    }

    /// Runs the fetch procedure with the stored variables.
    pub(crate) fn fetch(self: &Arc<Self>, preserve_previous_data: bool) -> RefetchHandle<T, E> {
        let (token, operation, variables, callbacks, pending) = {
            let mut state = self.state.lock();
            if state.disposed {
                return RefetchHandle::ready(state.snapshot.clone());
            }
            let token = state.tokens.begin_invocation();
            let pending = if preserve_previous_data {
                None
            } else {
                state.snapshot.begin();
                Some(self.mirror_locked(&mut state))
            };
            (
                token,
                state.operation.clone(),
                state.variables.clone(),
                state.callbacks.clone(),
                pending,
            )
        };

        if let Some((snapshot, version)) = pending {
            self.deliver(&snapshot, version);
        }
        tracing::debug!(
            generation = token.generation(),
            preserve_previous_data,
            "query fetch started"
        );

        // The operation's synchronous part runs here, outside the lock.
        let call = match panic::catch_unwind(AssertUnwindSafe(|| {
            operation.call(variables, token.signal())
        })) {
            Ok(call) => call,
            Err(_) => {
                tracing::error!(
                    generation = token.generation(),
                    "query operation panicked before returning a future"
                );
                return RefetchHandle::ready(self.snapshot());
            }
        };
        let shared = Arc::clone(self);
        let join = tokio::spawn(async move {
            let outcome = call.await;
            shared.settle(&token, outcome, &callbacks)
        });

        RefetchHandle {
            inner: HandleInner::Spawned {
                join,
                mirror: self.mirror.subscribe(),
            },
        }
    }

    fn settle(
        &self,
        token: &InvocationToken,
        outcome: Result<T, E>,
        callbacks: &Callbacks<T, E>,
    ) -> QuerySnapshot<T, E> {
        let succeeded = outcome.is_ok();
        let (snapshot, version) = {
            let mut state = self.state.lock();
            if !state.tokens.is_current(token) {
                tracing::trace!(generation = token.generation(), "discarding stale query outcome");
                return state.snapshot.clone();
            }
            match outcome {
                Ok(data) => state.snapshot.succeed(data),
                Err(error) => state.snapshot.fail(error),
            }
            self.mirror_locked(&mut state)
        };

        self.deliver(&snapshot, version);
        if succeeded {
            tracing::debug!(generation = token.generation(), "query fetch completed");
            if let Some(data) = snapshot.data() {
                callbacks.completed(data);
            }
        } else {
            tracing::debug!(generation = token.generation(), "query fetch failed");
            if let Some(error) = snapshot.error() {
                callbacks.failed(error);
            }
        }
        snapshot
    }

    fn mirror_locked(&self, state: &mut QueryState<V, T, E>) -> (QuerySnapshot<T, E>, u64) {
        state.published += 1;
        let snapshot = state.snapshot.clone();
        self.mirror.send_replace(snapshot.clone());
        (snapshot, state.published)
    }

    fn deliver(&self, snapshot: &QuerySnapshot<T, E>, version: u64) {
        let listeners = self.listeners.lock().clone();
        for (_, listener) in &listeners {
            // A listener published something newer; that delivery reached
            // everyone already.
            if self.state.lock().published != version {
                tracing::trace!(version, "skipping superseded notification");
                return;
            }
            listener(snapshot);
        }
    }
}

impl<V, T, E> Shared<V, T, E> {
    /// Invalidates anything in flight and refuses further fetches.
    pub(crate) fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.tokens.invalidate();
        }
        self.listeners.lock().clear();
        tracing::debug!("query controller disposed");
    }
}

/// Future resolving to the controller's snapshot once a fetch settles.
///
/// The handle never fails: a failed operation resolves with the error carried
/// in the snapshot. A fetch that was superseded resolves with whatever the
/// controller shows at that moment, which never includes the discarded
/// outcome. Dropping the handle does not cancel the fetch.
#[must_use = "the fetch runs regardless; await the handle to observe its outcome"]
pub struct RefetchHandle<T, E> {
    inner: HandleInner<T, E>,
}

enum HandleInner<T, E> {
    Spawned {
        join: JoinHandle<QuerySnapshot<T, E>>,
        mirror: watch::Receiver<QuerySnapshot<T, E>>,
    },
    Ready(Option<QuerySnapshot<T, E>>),
}

impl<T, E> RefetchHandle<T, E> {
    fn ready(snapshot: QuerySnapshot<T, E>) -> Self {
        Self {
            inner: HandleInner::Ready(Some(snapshot)),
        }
    }

    /// Returns `true` once the fetch has settled (or never started).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Spawned { join, .. } => join.is_finished(),
            HandleInner::Ready(_) => true,
        }
    }
}

// The snapshot is only ever moved out, never pinned.
impl<T, E> Unpin for RefetchHandle<T, E> {}

impl<T: Clone, E: Clone> Future for RefetchHandle<T, E> {
    type Output = QuerySnapshot<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleInner::Ready(snapshot) => Poll::Ready(snapshot.take().unwrap_or_default()),
            HandleInner::Spawned { join, mirror } => match Pin::new(join).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(snapshot)) => Poll::Ready(snapshot),
                Poll::Ready(Err(err)) => {
                    tracing::error!(%err, "query operation did not settle");
                    Poll::Ready(mirror.borrow().clone())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::mock::MockOperation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestShared = Shared<u32, String, QueryError>;

    fn shared_for(mock: &MockOperation<u32, String>) -> Arc<TestShared> {
        Shared::new(
            mock.operation(),
            1,
            Callbacks {
                on_completed: None,
                on_error: None,
            },
            QuerySnapshot::new(false),
        )
    }

    #[tokio::test]
    async fn test_fetch_commits_success() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let handle = shared.fetch(false);
        assert!(shared.snapshot().loading);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.variables(0), Some(1));

        mock.resolve(0, "X".to_string()).expect("call 0 pending");
        let snapshot = handle.await;

        assert!(!snapshot.loading);
        assert_eq!(snapshot.data(), Some(&"X".to_string()));
        assert_eq!(shared.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_failure_resolves_with_error_value() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let handle = shared.fetch(false);
        mock.reject(0, QueryError::failed("E")).expect("call 0 pending");
        let snapshot = handle.await;

        assert!(!snapshot.loading);
        assert_eq!(snapshot.data(), None);
        assert_eq!(snapshot.error(), Some(&QueryError::failed("E")));
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let first = shared.fetch(false);
        let second = shared.fetch(false);

        mock.resolve(0, "old".to_string()).expect("call 0 pending");
        let stale = first.await;
        assert!(stale.loading, "stale outcome must not commit");
        assert_eq!(stale.data(), None);

        mock.resolve(1, "new".to_string()).expect("call 1 pending");
        let latest = second.await;
        assert_eq!(latest.data(), Some(&"new".to_string()));
    }

    #[tokio::test]
    async fn test_preserve_previous_data_skips_pending_transition() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let _handle = shared.fetch(true);
        assert!(!shared.snapshot().loading);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refetch_updates_variables() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let _a = shared.refetch(VariablesUpdate::Keep);
        let _b = shared.refetch(VariablesUpdate::Replace(5));
        let _c = shared.refetch(VariablesUpdate::Merge(9));

        assert_eq!(mock.variables(0), Some(1));
        assert_eq!(mock.variables(1), Some(5));
        assert_eq!(mock.variables(2), Some(9));
        assert!(shared.called());
        assert_eq!(shared.explicit_fetches(), 3);
        assert_eq!(shared.pinned_variables(), None);
    }

    #[tokio::test]
    async fn test_listeners_see_pending_and_commit() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);
        let seen = Arc::new(AtomicUsize::new(0));

        shared.on_change({
            let seen = seen.clone();
            Arc::new(move |_: &QuerySnapshot<String, QueryError>| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handle = shared.fetch(false);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        mock.resolve(0, "X".to_string()).expect("call 0 pending");
        let _ = handle.await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispose_blocks_commit_and_new_fetches() {
        let mock = MockOperation::new();
        let shared = shared_for(&mock);

        let handle = shared.fetch(false);
        shared.dispose();
        mock.resolve(0, "late".to_string()).expect("call 0 pending");

        let snapshot = handle.await;
        assert_eq!(snapshot.data(), None);
        assert!(mock.was_cancelled(0));

        let after = shared.refetch(VariablesUpdate::Keep);
        assert!(after.is_finished());
        let _ = after.await;
        assert_eq!(mock.call_count(), 1);
    }
}
