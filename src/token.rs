//! Invocation tokens used to detect stale fetches.
//!
//! Every fetch begins by asking the [`TokenSource`] for a new
//! [`InvocationToken`]. Doing so invalidates the token handed out before it,
//! so when a fetch settles it can check [`TokenSource::is_current`] and drop
//! its outcome if a newer fetch has started in the meantime.
//!
//! Each token also carries a [`CancellationToken`] that is cancelled the
//! moment the token stops being current. Operations that accept the signal can
//! use it to abort work early; staleness itself is decided only by the
//! generation counter.

use tokio_util::sync::CancellationToken;

/// Marker identifying one in-flight fetch.
#[derive(Debug, Clone)]
pub struct InvocationToken {
    generation: u64,
    cancel: CancellationToken,
}

impl InvocationToken {
    /// Returns the generation this token was issued for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` once the token has been superseded or invalidated.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Future resolving when the token is superseded or invalidated.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Returns the cancellation signal handed to cancellable operations.
    #[must_use]
    pub fn signal(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Issues invocation tokens and tracks which one is current.
///
/// Only the current token is remembered, never a history: beginning a new
/// invocation invalidates exactly one predecessor.
///
/// # Example
///
/// ```
/// use lastcall::token::TokenSource;
///
/// let mut tokens = TokenSource::new();
/// let first = tokens.begin_invocation();
/// let second = tokens.begin_invocation();
///
/// assert!(!tokens.is_current(&first));
/// assert!(tokens.is_current(&second));
/// assert!(first.is_cancelled());
/// ```
#[derive(Debug, Default)]
pub struct TokenSource {
    generation: u64,
    current: Option<CancellationToken>,
}

impl TokenSource {
    /// Creates a token source with no current token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates the current token (if any) and returns a new current one.
    pub fn begin_invocation(&mut self) -> InvocationToken {
        self.invalidate();
        let cancel = CancellationToken::new();
        self.current = Some(cancel.clone());
        InvocationToken {
            generation: self.generation,
            cancel,
        }
    }

    /// Returns `true` iff no invocation began (and no invalidation happened)
    /// after `token` was issued.
    #[must_use]
    pub fn is_current(&self, token: &InvocationToken) -> bool {
        self.current.is_some() && token.generation == self.generation
    }

    /// Invalidates the current token without issuing a new one.
    pub fn invalidate(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Returns the generation of the most recently issued token.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
