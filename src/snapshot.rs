//! The observable state of a query.

/// A race-free view of a query's lifecycle.
///
/// While `loading` is `true`, `data` and `error` hold the last committed
/// values, not anything produced by the in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySnapshot<T, E> {
    /// `true` while the current fetch has not settled.
    pub loading: bool,
    /// Result of the last successful fetch, cleared when a new fetch begins.
    pub data: Option<T>,
    /// Failure of the last fetch, cleared when a new fetch begins.
    pub error: Option<E>,
    /// The `data` that was on display when the current fetch began.
    pub previous_data: Option<T>,
}

impl<T, E> QuerySnapshot<T, E> {
    /// Creates an empty snapshot, optionally already loading.
    #[must_use]
    pub const fn new(loading: bool) -> Self {
        Self {
            loading,
            data: None,
            error: None,
            previous_data: None,
        }
    }

    /// Returns the data if the last fetch succeeded.
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Returns the error if the last fetch failed.
    pub const fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    /// Returns the data that was current when the latest fetch began.
    pub const fn previous_data(&self) -> Option<&T> {
        self.previous_data.as_ref()
    }

    /// Returns `true` if a fetch is in flight.
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Returns `true` if the latest fetch settled successfully.
    pub const fn is_success(&self) -> bool {
        !self.loading && self.data.is_some()
    }

    /// Returns `true` if the latest fetch settled with an error.
    pub const fn is_error(&self) -> bool {
        !self.loading && self.error.is_some()
    }

    /// Pending transition applied when a fetch begins.
    pub(crate) fn begin(&mut self) {
        self.previous_data = self.data.take();
        self.loading = true;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.loading = false;
        self.error = None;
    }

    /// `previous_data` is deliberately left alone.
    pub(crate) fn fail(&mut self, error: E) {
        self.data = None;
        self.loading = false;
        self.error = Some(error);
    }

    /// Rest state while a query is skipped. `data` is untouched.
    pub(crate) fn pause(&mut self) {
        self.loading = false;
        self.error = None;
    }
}

impl<T, E> Default for QuerySnapshot<T, E> {
    fn default() -> Self {
        Self::new(false)
    }
}
