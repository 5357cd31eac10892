//! Prelude module for convenient imports.
//!
//! ```
//! use lastcall::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`QueryController`] and [`LazyQueryController`] - The controllers
//! - [`QueryResult`], [`LazyQueryResult`], [`Refetch`], [`Execute`] - What a cycle returns
//! - [`Operation`] - The async function being tracked
//! - [`QueryOptions`] - Per-cycle inputs
//! - [`QuerySnapshot`], [`RefetchHandle`], [`ListenerId`] - Observing outcomes
//! - [`Variables`] - Merging refetch support
//! - [`QueryError`] - A ready-made operation error

pub use crate::controller::{QueryController, QueryResult, Refetch};
pub use crate::error::QueryError;
pub use crate::fetch::{ListenerId, RefetchHandle};
pub use crate::lazy::{Execute, LazyQueryController, LazyQueryResult};
pub use crate::operation::Operation;
pub use crate::options::QueryOptions;
pub use crate::snapshot::QuerySnapshot;
pub use crate::variables::Variables;
