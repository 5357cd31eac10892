//! Decides, once per host cycle, whether a fetch must start automatically.
//!
//! The host reports each cycle's inputs in a render pass and confirms them in
//! a commit pass. Comparison is always against the inputs of the last
//! committed cycle, so a host that renders the same logical cycle twice sees
//! the same change twice. The one-shot `scheduled` latch turns that into a
//! single pending transition and a single fetch; it is cleared when the
//! commit pass starts the fetch.

use crate::operation::Operation;

/// Inputs of one host cycle.
pub(crate) struct Cycle<V, T, E> {
    operation: Operation<V, T, E>,
    variables: V,
    skip: bool,
}

impl<V: PartialEq, T, E> Cycle<V, T, E> {
    pub(crate) const fn new(operation: Operation<V, T, E>, variables: V, skip: bool) -> Self {
        Self {
            operation,
            variables,
            skip,
        }
    }

    fn same_inputs(&self, other: &Self) -> bool {
        Operation::ptr_eq(&self.operation, &other.operation)
            && self.variables == other.variables
            && self.skip == other.skip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Skipped. `entering` is set when the last committed cycle was not.
    Pause { entering: bool },
    /// Inputs changed: apply the pending state and schedule a fetch.
    Fetch,
    /// A fetch is already scheduled for this cycle; point it at these inputs.
    Reschedule,
    Unchanged,
}

pub(crate) struct ChangeDetector<V, T, E> {
    committed: Option<Cycle<V, T, E>>,
    rendered: Option<Cycle<V, T, E>>,
    scheduled: bool,
    run_on_create: bool,
}

impl<V: PartialEq, T, E> ChangeDetector<V, T, E> {
    /// `run_on_create` is `false` for lazy controllers.
    pub(crate) const fn new(run_on_create: bool) -> Self {
        Self {
            committed: None,
            rendered: None,
            scheduled: false,
            run_on_create,
        }
    }

    /// Render pass. `armed` is `false` while a lazy controller has not been
    /// called yet; detectors that run on create ignore it.
    pub(crate) fn evaluate(&mut self, cycle: Cycle<V, T, E>, armed: bool) -> Decision {
        let decision = if cycle.skip {
            self.scheduled = false;
            Decision::Pause {
                entering: self.committed.as_ref().is_none_or(|prev| !prev.skip),
            }
        } else if self.scheduled {
            Decision::Reschedule
        } else if !armed && !self.run_on_create {
            Decision::Unchanged
        } else {
            let changed = match &self.committed {
                None => self.run_on_create,
                Some(prev) => !prev.same_inputs(&cycle),
            };
            if changed {
                self.scheduled = true;
                Decision::Fetch
            } else {
                Decision::Unchanged
            }
        };
        self.rendered = Some(cycle);
        decision
    }

    /// Returns `true` if `variables` differ from the last committed cycle's.
    pub(crate) fn variables_changed(&self, variables: &V) -> bool {
        self.committed
            .as_ref()
            .is_none_or(|prev| prev.variables != *variables)
    }

    /// Records `cycle` as committed without scheduling anything. Used when an
    /// explicit fetch already ran for these inputs.
    pub(crate) fn rebase(&mut self, cycle: Cycle<V, T, E>) {
        self.committed = Some(cycle);
    }

    /// Commit pass. Returns `true` exactly once per scheduled fetch.
    pub(crate) fn commit(&mut self) -> bool {
        if let Some(cycle) = self.rendered.take() {
            self.committed = Some(cycle);
        }
        std::mem::take(&mut self.scheduled)
    }
}

impl<V, T, E> ChangeDetector<V, T, E> {
    pub(crate) const fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}
