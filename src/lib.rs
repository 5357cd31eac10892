//! # Lastcall - latest-wins async query controllers
//!
//! Lastcall tracks the lifecycle of an asynchronous operation on behalf of a
//! host that re-runs on input changes (a UI loop, a reactive view, a polling
//! service). It fetches automatically when the inputs change, suppresses
//! every outcome but the latest one, and exposes a plain snapshot the host can
//! read on each cycle.
//!
//! ## Core Components
//!
//! - [`QueryController`](controller::QueryController): fetches on creation and
//!   whenever the operation, variables, or skip flag change
//! - [`LazyQueryController`](lazy::LazyQueryController): fetches only after an
//!   explicit `execute`
//! - [`Operation`](operation::Operation): the user-supplied async function
//! - [`QueryOptions`](options::QueryOptions): per-cycle inputs and callbacks
//! - [`QuerySnapshot`](snapshot::QuerySnapshot): `loading`, `data`, `error`,
//!   and `previous_data`
//! - [`MockOperation`](mock::MockOperation): settles calls on demand in tests
//!
//! ## Latest wins
//!
//! Every fetch is tagged with a fresh invocation token. Starting another fetch
//! invalidates the previous token, and an outcome whose token is no longer
//! current is dropped: it neither changes the snapshot nor runs callbacks.
//! Invalidated fetches also receive a cancellation signal, see
//! [`Operation::cancellable`](operation::Operation::cancellable).
//!
//! ## Example
//!
//! ```
//! use lastcall::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let search = Operation::new(|term: String| async move {
//!     Ok::<_, QueryError>(vec![format!("{term}-1"), format!("{term}-2")])
//! });
//!
//! let mut query = QueryController::new(search.clone(), QueryOptions::new("rust".to_string()));
//!
//! // Each host cycle reports the current inputs
//! let result = query.update(&search, QueryOptions::new("rust".to_string()));
//! assert!(result.loading);
//!
//! // Explicit refetch with new variables
//! let snapshot = query.refetch_replace("tokio".to_string()).await;
//! assert_eq!(snapshot.data(), Some(&vec!["tokio-1".to_string(), "tokio-2".to_string()]));
//! # }
//! ```
//!
//! Fetches run as Tokio tasks, so cycles and refetches must happen within a
//! Tokio runtime.

pub mod controller;
mod detector;
pub mod error;
pub mod fetch;
pub mod lazy;
pub mod mock;
pub mod operation;
pub mod options;
pub mod prelude;
pub mod snapshot;
pub mod token;
pub mod variables;
