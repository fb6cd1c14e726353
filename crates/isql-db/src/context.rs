//! Cancellation and deadlines for database calls.
//!
//! Every capability trait offers a `*_ctx` form of each operation that takes
//! a [`Context`]. The context carries a [`CancellationToken`] and an optional
//! deadline. Routers pass it through untouched; drivers honour it by wrapping
//! their I/O in [`Context::guard`].

use std::future::Future;
use std::time::Duration;

use isql_core::{DbError, DbResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation scope for one or more database calls.
///
/// Children created with [`with_cancel`](Self::with_cancel),
/// [`with_timeout`](Self::with_timeout) or
/// [`with_deadline`](Self::with_deadline) are cancelled when their parent is,
/// but cancelling a child leaves the parent untouched. A child's deadline
/// never extends its parent's.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use isql_db::Context;
///
/// let root = Context::background();
/// let call = root.with_timeout(Duration::from_secs(5));
/// assert!(call.deadline().is_some());
///
/// call.cancel();
/// assert!(call.is_cancelled());
/// assert!(!root.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Returns a context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a child that can be cancelled independently.
    #[must_use]
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Returns a child whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a child with the given deadline, or the parent's if earlier.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if this context (or an ancestor) was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the deadline, if any.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> DbResult<()> {
        if self.token.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Err(DbError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline passes, whichever happens first.
    ///
    /// The future is dropped when the context wins the race.
    pub async fn guard<F>(&self, fut: F) -> DbResult<F::Output>
    where
        F: Future + Send,
    {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(DbError::Cancelled),
            () = expired => Err(DbError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        assert_eq!(ctx.guard(async { 5 }).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let ctx = Context::background().with_cancel();
        ctx.cancel();
        let err = ctx.guard(async { 5 }).await.unwrap_err();
        assert_eq!(err, DbError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_call() {
        let ctx = Context::background().with_cancel();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = ctx.guard(std::future::pending::<()>()).await.unwrap_err();
        assert_eq!(err, DbError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let err = ctx
            .guard(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert_eq!(err, DbError::DeadlineExceeded);
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let parent = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.check(), Err(DbError::Cancelled));
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = Context::background();
        let child = parent.with_cancel();
        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(parent.check().is_ok());
    }

    #[tokio::test]
    async fn test_child_deadline_never_extends_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
