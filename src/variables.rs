//! Query variables and partial-update merging.
//!
//! Variables are compared structurally (via [`PartialEq`]) across host
//! cycles, so a host that rebuilds an equivalent value every cycle does not
//! trigger spurious fetches.
//!
//! [`Variables::merge`] implements the merging `refetch`: a patch is folded
//! into the stored variables and the result becomes the new stored value.
//! Key/value maps merge as a shallow union where patch keys win, and scalars
//! are simply replaced. For your own types, pick a patch type that expresses
//! "only these fields":
//!
//! ```
//! use lastcall::variables::Variables;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Page {
//!     offset: usize,
//!     limit: usize,
//! }
//!
//! #[derive(Default)]
//! struct PagePatch {
//!     offset: Option<usize>,
//!     limit: Option<usize>,
//! }
//!
//! impl Variables for Page {
//!     type Patch = PagePatch;
//!
//!     fn merge(&self, patch: PagePatch) -> Self {
//!         Self {
//!             offset: patch.offset.unwrap_or(self.offset),
//!             limit: patch.limit.unwrap_or(self.limit),
//!         }
//!     }
//! }
//!
//! let page = Page { offset: 0, limit: 20 };
//! let next = page.merge(PagePatch { offset: Some(20), ..PagePatch::default() });
//! assert_eq!(next, Page { offset: 20, limit: 20 });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// Input value passed to an operation.
pub trait Variables: Clone + PartialEq + Send + Sync + 'static {
    /// Partial update accepted by the merging `refetch`.
    type Patch: Send + 'static;

    /// Returns `self` with `patch` applied on top.
    #[must_use]
    fn merge(&self, patch: Self::Patch) -> Self;
}

/// Operations without variables.
impl Variables for () {
    type Patch = ();

    fn merge(&self, (): ()) -> Self {}
}

/// Scalars have no partial form: a patch replaces the stored value.
macro_rules! replace_on_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Variables for $ty {
                type Patch = Self;

                fn merge(&self, patch: Self) -> Self {
                    patch
                }
            }
        )*
    };
}

replace_on_merge!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String,
);

impl<K, V, S> Variables for HashMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: PartialEq + Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Patch = Self;

    fn merge(&self, patch: Self) -> Self {
        let mut merged = self.clone();
        merged.extend(patch);
        merged
    }
}

impl<K, V> Variables for BTreeMap<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: PartialEq + Clone + Send + Sync + 'static,
{
    type Patch = Self;

    fn merge(&self, patch: Self) -> Self {
        let mut merged = self.clone();
        merged.extend(patch);
        merged
    }
}
