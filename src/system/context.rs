// src/system/context.rs

//! Cancellation and deadline propagation for spawned processes.
//!
//! A [`Context`] is a cheap, cloneable handle. Clones share the same cancellation
//! token, so cancelling any clone cancels them all. [`Context::child`] derives a
//! context that is done when its parent is, but which can be cancelled on its own.

use crate::CancellationToken;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Done {
    /// The context (or one of its ancestors) was cancelled.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("context cancelled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// A cancellation/deadline handle passed through to process creation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    parent: Option<Arc<Context>>,
}

impl Context {
    /// A context that is never done unless cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wraps an existing token. Setting the token to `true` cancels the context.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// A new context that is done when `self` is, with its own cancellation token.
    pub fn child(&self) -> Self {
        Self {
            token: Arc::new(AtomicBool::new(false)),
            deadline: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Derives a child context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(deadline);
        child
    }

    /// Requests cancellation of this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.store(true, Ordering::SeqCst);
    }

    /// The token this context observes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The earliest deadline of this context and its ancestors.
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.deadline());
        match (self.deadline, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn done(&self) -> Option<Done> {
        if self.token.load(Ordering::SeqCst) {
            return Some(Done::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(Done::DeadlineExceeded);
            }
        }
        self.parent.as_ref().and_then(|p| p.done())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_done() {
        assert_eq!(Context::background().done(), None);
        assert_eq!(Context::background().deadline(), None);
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = Context::background();
        let clone = ctx.clone();
        clone.cancel();
        assert_eq!(ctx.done(), Some(Done::Cancelled));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert_eq!(child.done(), Some(Done::Cancelled));
        assert_eq!(parent.done(), None);

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.done(), Some(Done::Cancelled));
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.done(), Some(Done::DeadlineExceeded));
    }

    #[test]
    fn test_deadline_is_earliest_of_chain() {
        let far = Context::background().with_timeout(Duration::from_secs(60));
        let near = far.with_timeout(Duration::from_secs(1));
        assert!(near.deadline() < far.deadline());

        let loose = near.with_timeout(Duration::from_secs(120));
        assert_eq!(loose.deadline(), near.deadline());
    }

    #[test]
    fn test_external_token() {
        let token: CancellationToken = Arc::new(AtomicBool::new(false));
        let ctx = Context::with_token(token.clone());
        assert_eq!(ctx.done(), None);
        token.store(true, Ordering::SeqCst);
        assert_eq!(ctx.done(), Some(Done::Cancelled));
    }
}
